//! Partition-aware HTTP client for mirrored topics.
//!
//! Keys are routed straight to the replica owning their partition. When a
//! replica cannot be reached the request is repeated once against the
//! load-balanced mirror service, and the routing table is refreshed before
//! the next read.

pub mod client;
pub mod config;
pub mod parser;
pub mod partition;
pub mod request;
pub mod routing;
pub mod transport;

pub use client::MirrorQueryClient;
pub use config::MirrorClientConfig;
pub use partition::{murmur2, to_positive, DefaultPartitionFinder, PartitionFinder};
pub use request::{FailedRequest, MirrorRequestManager, ResponseEnvelope};
pub use routing::{PartitionRouter, RoutingTable};
pub use transport::{MirrorTransport, RawResponse};
