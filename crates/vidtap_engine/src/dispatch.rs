use vidtap_core::{ConsumerMessage, TabId};
use vidtap_logging::{tab_debug, tab_warn};

use crate::{BrowserHost, HostError};

/// Fire-and-forget delivery of an outcome message to the tab's consumer.
///
/// Failures are logged; nothing is retried or queued.
pub async fn deliver<H>(host: &H, tab_id: TabId, message: &ConsumerMessage)
where
    H: BrowserHost + ?Sized,
{
    let payload = match serde_json::to_value(message) {
        Ok(payload) => payload,
        Err(err) => {
            tab_warn!(tab_id, "could not encode consumer message: {}", err);
            return;
        }
    };
    match host.send_message(tab_id, &payload).await {
        Ok(()) => tab_debug!(tab_id, "delivered {}", payload["action"]),
        Err(HostError::NoReceiver) => {
            tab_debug!(tab_id, "no consumer listening for {}", payload["action"]);
        }
        Err(err) => tab_warn!(tab_id, "failed to deliver {}: {}", payload["action"], err),
    }
}
