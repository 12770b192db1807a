mod channel;
mod connection_state;
mod subscription_key;

pub use channel::{Channel, UnknownChannel};
pub use connection_state::ConnectionState;
pub use subscription_key::SubscriptionKey;
