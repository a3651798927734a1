pub mod client;
pub mod messages;

pub use client::{BrokerClient, ConnectionState, Delivery, DeliveryStream};
