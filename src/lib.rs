//! Kubernetes cluster inventory
//!
//! Registers clusters by kubeconfig, keeps each credential in its own
//! Secret and all metadata in one shared ConfigMap, tests connectivity and
//! discovers the cluster the service itself runs in.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod inventory;
pub mod kube;
pub mod kubeconfig;
pub mod monitor;
pub mod record;
pub mod registry;
pub mod server;
pub mod storage;
pub mod tester;
