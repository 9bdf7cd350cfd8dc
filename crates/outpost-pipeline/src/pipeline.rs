use std::sync::Arc;

use outpost_core::config::{ChannelIds, RoleIds};
use outpost_core::RuntimeSettings;
use outpost_monitor::Monitor;
use outpost_platform::{ApiExecutor, EventContext, Gateway, ThreadManager};
use outpost_store::Store;
use outpost_workers::EventPool;

/// Shared context for every pipeline handler: the store, the monitor, the
/// platform seam, and the resolved channel/role ids.
pub struct Pipeline {
    pub store: Arc<Store>,
    pub monitor: Arc<Monitor>,
    pub gateway: Arc<dyn Gateway>,
    pub executor: Arc<ApiExecutor>,
    pub pool: Arc<EventPool>,
    pub settings: Arc<RuntimeSettings>,
    pub channels: ChannelIds,
    pub roles: RoleIds,
}

impl Pipeline {
    /// Resolve the user's recruitment forum thread.
    pub(crate) async fn thread_manager(&self, ctx: &EventContext, user_id: &str) -> ThreadManager {
        ThreadManager::resolve(
            self.gateway.clone(),
            self.executor.clone(),
            ctx.clone(),
            self.channels.recruitment_forum.clone(),
            user_id,
        )
        .await
    }
}
