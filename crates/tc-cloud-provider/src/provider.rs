//! The contract every cloud backend implements.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tc_mqtt_channel::Channel;
use tc_protocol::{DataSample, TagExtreme};

use crate::error::ProviderResult;

/// Uplink to one cloud backend.
///
/// Completion of every operation is the value of the returned future.
/// A `Connection` is owned by a single caller: publishes borrow it,
/// `disconnect` needs it mutably, so the two cannot overlap.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Open a session with the configured settings.
    async fn connect(&self) -> ProviderResult<Connection>;

    /// Publish a batch of samples. Fire-and-forget, no retry.
    async fn upload_samples(
        &self,
        conn: &Connection,
        samples: &[DataSample],
    ) -> ProviderResult<Delivery>;

    /// Publish the extremes of an acquisition run. Fire-and-forget, no retry.
    async fn upload_extreme(
        &self,
        conn: &Connection,
        extreme: &TagExtreme,
    ) -> ProviderResult<Delivery>;

    /// Release the session. Leaves `conn` idle; never fails.
    async fn disconnect(&self, conn: &mut Connection);
}

/// Handle returned by [`CloudProvider::connect`].
#[derive(Debug, Default)]
pub enum Connection {
    /// Open session.
    Live(LiveSession),
    /// Never connected, or already disconnected.
    #[default]
    Idle,
}

impl Connection {
    pub fn is_live(&self) -> bool {
        matches!(self, Connection::Live(_))
    }
}

/// Open session wrapped by [`Connection::Live`].
///
/// Only providers in this crate can create one.
pub struct LiveSession {
    client_id: String,
    channel: Arc<dyn Channel>,
}

impl LiveSession {
    pub(crate) fn new(client_id: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        Self {
            client_id: client_id.into(),
            channel,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn channel(&self) -> &dyn Channel {
        self.channel.as_ref()
    }
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// What happened to a publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the session at QoS 0. No broker acknowledgement exists.
    Published,
    /// The connection was not live; nothing was sent.
    Skipped,
}
