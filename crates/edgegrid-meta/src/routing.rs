//! Where replies and forwarded messages go.

use edgegrid_bus::Message;
use edgegrid_core::modules::{EDGE_FUNCTION, EDGED, OK};
use tracing::{debug, warn};

use crate::error::MetaError;
use crate::manager::MetaManager;

impl MetaManager {
    /// One-way relay to edged.
    pub(crate) async fn send_to_edged(&self, msg: Message) {
        if let Err(e) = self.bus.send(EDGED, msg.forwarded()).await {
            warn!(error = %e, "send to edged failed");
        }
    }

    pub(crate) async fn send_to_edge_function(&self, msg: Message) {
        if let Err(e) = self.bus.send(EDGE_FUNCTION, msg.forwarded()).await {
            warn!(error = %e, "send to edge function failed");
        }
    }

    pub(crate) async fn send_to_cloud(&self, msg: Message) {
        let group = &self.config.context_send_group;
        match self.bus.send_to_group(group, msg.forwarded()).await {
            Ok(delivered) => debug!(%group, delivered, "sent to cloud"),
            Err(e) => warn!(%group, error = %e, "send to cloud failed"),
        }
    }

    /// Deliver `reply` to whoever sent `request`: the blocked caller if
    /// the request was synchronous, edged if it came from edged, the
    /// cloud group otherwise.
    pub(crate) async fn reply_to_source(&self, request: &Message, reply: Message) {
        if self.try_sync_reply(request, &reply).await {
            return;
        }
        if request.source == EDGED {
            self.send_to_edged(reply).await;
        } else {
            self.send_to_cloud(reply).await;
        }
    }

    pub(crate) async fn feedback_error(&self, err: &MetaError, request: &Message) {
        let reply = request.new_error(err.to_string());
        self.reply_to_source(request, reply).await;
    }

    pub(crate) async fn ok_to_cloud(&self, request: &Message) {
        self.send_to_cloud(request.new_response(OK)).await;
    }

    pub(crate) async fn ok_to_edged(&self, request: &Message) {
        let reply = request.new_response(OK);
        if !self.try_sync_reply(request, &reply).await {
            self.send_to_edged(reply).await;
        }
    }

    async fn try_sync_reply(&self, request: &Message, reply: &Message) -> bool {
        if !request.is_sync() {
            return false;
        }
        match self.bus.send_resp(reply.clone()).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "sync caller gone, routing reply by source");
                false
            }
        }
    }
}
