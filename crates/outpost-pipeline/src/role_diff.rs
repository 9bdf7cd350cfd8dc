use tracing::debug;

use outpost_platform::{EventContext, Member};

use crate::pipeline::Pipeline;

/// `(added, removed)` between two role sets.
pub fn diff_roles(old_roles: &[String], new_roles: &[String]) -> (Vec<String>, Vec<String>) {
    let added = new_roles
        .iter()
        .filter(|r| !old_roles.contains(r))
        .cloned()
        .collect();
    let removed = old_roles
        .iter()
        .filter(|r| !new_roles.contains(r))
        .cloned()
        .collect();
    (added, removed)
}

impl Pipeline {
    /// Entry point for a member's role update. `member.roles` is the new
    /// role set. Runs the gained chain, then the lost chain; each chain
    /// short-circuits on its first matching rule.
    pub async fn handle_role_change(
        &self,
        ctx: &EventContext,
        member: &Member,
        old_roles: &[String],
    ) {
        let (added, removed) = diff_roles(old_roles, member.roles.as_slice());
        debug!(
            trace_id = %ctx.trace_id,
            user_id = %member.user_id,
            added = added.len(),
            removed = removed.len(),
            "processing role change"
        );
        if !added.is_empty() {
            self.handle_roles_gained(ctx, member, &added).await;
        }
        if !removed.is_empty() {
            self.handle_roles_lost(ctx, member, &removed).await;
        }
        debug!(trace_id = %ctx.trace_id, "role change complete");
    }
}
