//! Small helpers that enqueue platform mutations on the API executor.

use std::sync::Arc;

use tracing::debug;

use outpost_platform::{ApiExecutor, Embed, EventContext, Gateway};

pub async fn add_role(
    gateway: &Arc<dyn Gateway>,
    executor: &ApiExecutor,
    ctx: &EventContext,
    user_id: &str,
    role_id: &str,
) {
    let gateway = gateway.clone();
    let (user_id, role_id) = (user_id.to_string(), role_id.to_string());
    debug!(trace_id = %ctx.trace_id, user_id, role_id, "queueing role add");
    executor
        .submit(
            ctx.clone(),
            Box::new(move || Box::pin(async move { gateway.add_role(&user_id, &role_id).await })),
        )
        .await;
}

pub async fn remove_role(
    gateway: &Arc<dyn Gateway>,
    executor: &ApiExecutor,
    ctx: &EventContext,
    user_id: &str,
    role_id: &str,
) {
    let gateway = gateway.clone();
    let (user_id, role_id) = (user_id.to_string(), role_id.to_string());
    debug!(trace_id = %ctx.trace_id, user_id, role_id, "queueing role remove");
    executor
        .submit(
            ctx.clone(),
            Box::new(move || {
                Box::pin(async move { gateway.remove_role(&user_id, &role_id).await })
            }),
        )
        .await;
}

pub async fn add_roles(
    gateway: &Arc<dyn Gateway>,
    executor: &ApiExecutor,
    ctx: &EventContext,
    user_id: &str,
    role_ids: &[String],
) {
    for role_id in role_ids {
        add_role(gateway, executor, ctx, user_id, role_id).await;
    }
}

pub async fn remove_roles(
    gateway: &Arc<dyn Gateway>,
    executor: &ApiExecutor,
    ctx: &EventContext,
    user_id: &str,
    role_ids: &[String],
) {
    for role_id in role_ids {
        remove_role(gateway, executor, ctx, user_id, role_id).await;
    }
}

pub async fn send_channel_message(
    gateway: &Arc<dyn Gateway>,
    executor: &ApiExecutor,
    ctx: &EventContext,
    channel_id: &str,
    message: impl Into<String>,
) {
    let gateway = gateway.clone();
    let channel_id = channel_id.to_string();
    let message = message.into();
    executor
        .submit(
            ctx.clone(),
            Box::new(move || {
                Box::pin(async move { gateway.send_message(&channel_id, &message).await })
            }),
        )
        .await;
}

pub async fn send_channel_embed(
    gateway: &Arc<dyn Gateway>,
    executor: &ApiExecutor,
    ctx: &EventContext,
    channel_id: &str,
    embed: Embed,
) {
    let gateway = gateway.clone();
    let channel_id = channel_id.to_string();
    executor
        .submit(
            ctx.clone(),
            Box::new(move || {
                Box::pin(async move { gateway.send_embed(&channel_id, &embed).await })
            }),
        )
        .await;
}

pub async fn send_direct_message(
    gateway: &Arc<dyn Gateway>,
    executor: &ApiExecutor,
    ctx: &EventContext,
    user_id: &str,
    message: impl Into<String>,
) {
    let gateway = gateway.clone();
    let user_id = user_id.to_string();
    let message = message.into();
    executor
        .submit(
            ctx.clone(),
            Box::new(move || {
                Box::pin(async move { gateway.send_direct_message(&user_id, &message).await })
            }),
        )
        .await;
}
