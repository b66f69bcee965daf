//! Handler context for unified parameter passing
//!
//! Every handler receives a `HandlerContext`: the shared cluster, the
//! connection's client state and the version the request was decoded at.
//! Version-gated response fields are set by looking at `api_version`.

use super::broker::BrokerInfo;
use super::context::ClientContext;
use super::store::Store;

pub struct HandlerContext<'a> {
    /// Cluster the request operates on
    pub store: &'a Store,

    /// Per-connection state (client id, joined groups)
    ///
    /// Mutable because JoinGroup records the member id it hands out and
    /// Metadata stores the auto-create flag.
    pub client: &'a mut ClientContext,

    /// Version of the request being served
    pub api_version: i16,
}

impl<'a> HandlerContext<'a> {
    pub fn new(store: &'a Store, client: &'a mut ClientContext, api_version: i16) -> Self {
        Self {
            store,
            client,
            api_version,
        }
    }

    /// The broker whose listener accepted this connection
    pub fn broker(&self) -> Option<BrokerInfo> {
        self.store.broker_by_port(self.client.server_port)
    }

    /// True when the request version is at least `version`
    pub fn at_least(&self, version: i16) -> bool {
        self.api_version >= version
    }
}
