use std::sync::Arc;

use async_trait::async_trait;

use super::*;
use crate::cancel::CancelToken;
use crate::checkpoint::MemoryCheckpointer;
use crate::model::{ModelRequest, ModelResponse};
use crate::queue::SendOptions;
use crate::store::MemoryStateStore;
use crate::types::{Message, Role};

/// Always answers with a short acknowledgement, never exhausts.
struct ReplyModel;

#[async_trait]
impl ModelProvider for ReplyModel {
    async fn complete(
        &self,
        _request: ModelRequest,
        _cancel: &CancelToken,
    ) -> crate::error::AgentResult<ModelResponse> {
        Ok(ModelResponse {
            message: Message::assistant("ack"),
            stop_reason: Some("stop".into()),
            usage: None,
        })
    }

    fn model_name(&self) -> &str {
        "reply"
    }
}

fn deps() -> PoolDependencies {
    PoolDependencies {
        checkpointer: Some(Arc::new(MemoryCheckpointer::new())),
        store: Some(Arc::new(MemoryStateStore::new())),
        ..PoolDependencies::new(Arc::new(ReplyModel))
    }
}

fn pool() -> AgentPool {
    AgentPool::new(deps(), PoolConfig::default())
}

// ─── Pool ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_get_and_duplicate() {
    let pool = pool();
    let agent = pool.create("alpha", AgentConfig::default()).expect("create");
    assert_eq!(agent.agent_id(), "alpha");
    assert!(pool.get("alpha").is_some());

    let err = pool
        .create("alpha", AgentConfig::default())
        .expect_err("duplicate rejected");
    assert_eq!(err.error_code(), "INVALID_STATE");
}

#[tokio::test]
async fn capacity_is_enforced() {
    let pool = AgentPool::new(deps(), PoolConfig { max_agents: 2 });
    pool.create("a", AgentConfig::default()).expect("create");
    pool.create("b", AgentConfig::default()).expect("create");
    let err = pool.create("c", AgentConfig::default()).expect_err("full");
    assert_eq!(err.error_code(), "INVALID_STATE");
}

#[tokio::test]
async fn list_filters_by_prefix() {
    let pool = pool();
    for id in ["worker-1", "worker-2", "scout-1"] {
        pool.create(id, AgentConfig::default()).expect("create");
    }
    assert_eq!(pool.list(None).len(), 3);
    assert_eq!(
        pool.list(Some("worker-")),
        vec!["worker-1".to_string(), "worker-2".to_string()]
    );
}

#[tokio::test]
async fn status_of_unknown_agent_fails() {
    let pool = pool();
    let err = pool.status("ghost").expect_err("unknown");
    assert_eq!(err.error_code(), "INVALID_STATE");

    pool.create("real", AgentConfig::default()).expect("create");
    let status = pool.status("real").expect("status");
    assert_eq!(status.agent_id, "real");
    assert_eq!(status.step_count, 0);
}

#[tokio::test]
async fn remove_disposes_but_keeps_store() {
    let pool = pool();
    let agent = pool.create("alpha", AgentConfig::default()).expect("create");
    agent.run(Some("hi"), &CancelToken::new()).await.expect("run");

    assert!(pool.remove("alpha").await);
    assert!(pool.get("alpha").is_none());
    assert!(!pool.remove("alpha").await, "second remove is a no-op");

    // Conversation state survives a remove.
    let store = pool.deps.store.as_ref().expect("store");
    assert!(store.load("agent:alpha").await.expect("load").is_some());

    // The removed handle is disposed.
    let err = agent.send("too late", SendOptions::default()).expect_err("disposed");
    assert_eq!(err.error_code(), "INVALID_STATE");
}

#[tokio::test]
async fn delete_also_clears_the_store() {
    let pool = pool();
    let agent = pool.create("alpha", AgentConfig::default()).expect("create");
    agent.run(Some("hi"), &CancelToken::new()).await.expect("run");

    pool.delete("alpha").await.expect("delete");
    let store = pool.deps.store.as_ref().expect("store");
    assert!(store.load("agent:alpha").await.expect("load").is_none());
}

#[tokio::test]
async fn resume_restores_from_latest_checkpoint() {
    let pool = pool();
    let agent = pool.create("alpha", AgentConfig::default()).expect("create");
    agent.run(Some("remember me"), &CancelToken::new()).await.expect("run");
    let steps_before = agent.status().step_count;
    let history_before = agent.history().await;
    agent.checkpoint().await.expect("checkpoint");
    pool.remove("alpha").await;

    let resumed = pool
        .resume("alpha", AgentConfig::default())
        .await
        .expect("resume");
    assert_eq!(resumed.agent_id(), "alpha");
    assert_eq!(resumed.status().step_count, steps_before);
    assert_eq!(resumed.history().await, history_before);
}

#[tokio::test]
async fn resume_returns_live_agent_without_touching_checkpoints() {
    let pool = pool();
    let agent = pool.create("alpha", AgentConfig::default()).expect("create");
    let resumed = pool
        .resume("alpha", AgentConfig::default())
        .await
        .expect("resume");
    assert!(Arc::ptr_eq(&agent, &resumed));
}

#[tokio::test]
async fn resume_without_checkpoint_fails() {
    let pool = pool();
    let err = pool
        .resume("never-existed", AgentConfig::default())
        .await
        .expect_err("no checkpoint");
    assert_eq!(err.error_code(), "INVALID_STATE");
}

#[tokio::test]
async fn resume_all_walks_store_keys() {
    let pool = pool();
    for id in ["alpha", "beta"] {
        let agent = pool.create(id, AgentConfig::default()).expect("create");
        agent.run(Some("hi"), &CancelToken::new()).await.expect("run");
        agent.checkpoint().await.expect("checkpoint");
    }
    pool.dispose().await;
    assert!(pool.is_empty());

    let resumed = pool
        .resume_all(|_| AgentConfig::default())
        .await
        .expect("resume all");
    assert_eq!(resumed.len(), 2);
    assert_eq!(pool.list(None), vec!["alpha".to_string(), "beta".to_string()]);
}

#[tokio::test]
async fn fork_registers_the_branch() {
    let pool = pool();
    let agent = pool.create("alpha", AgentConfig::default()).expect("create");
    agent.run(Some("x"), &CancelToken::new()).await.expect("run");

    let explicit = pool.fork("alpha", Some("beta")).await.expect("fork");
    assert_eq!(explicit.agent_id(), "beta");
    assert_eq!(explicit.history().await, agent.history().await);

    let auto = pool.fork("alpha", None).await.expect("fork");
    assert!(auto.agent_id().starts_with("alpha-fork-"));
    assert_eq!(pool.len(), 3);
}

#[tokio::test]
async fn dispose_empties_the_pool() {
    let pool = pool();
    pool.create("a", AgentConfig::default()).expect("create");
    pool.create("b", AgentConfig::default()).expect("create");
    pool.dispose().await;
    assert!(pool.is_empty());
}

// ─── Room ──────────────────────────────────────────────────────────────────

async fn room_with_members(names: &[&str]) -> (Arc<AgentPool>, Room) {
    let pool = Arc::new(pool());
    let room = Room::new(pool.clone());
    for name in names {
        let agent_id = format!("agent-{name}");
        pool.create(&agent_id, AgentConfig::default()).expect("create");
        room.join(*name, agent_id);
    }
    (pool, room)
}

async fn first_user_message(pool: &AgentPool, agent_id: &str) -> Option<String> {
    let agent = pool.get(agent_id)?;
    agent
        .history()
        .await
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
}

#[tokio::test]
async fn mentions_route_only_to_named_members() {
    let (pool, room) = room_with_members(&["alice", "bob", "carol"]).await;

    room.say("carol", "hello @alice @bob", &CancelToken::new())
        .await
        .expect("say");

    assert_eq!(
        first_user_message(&pool, "agent-alice").await.as_deref(),
        Some("[from:carol] hello @alice @bob")
    );
    assert_eq!(
        first_user_message(&pool, "agent-bob").await.as_deref(),
        Some("[from:carol] hello @alice @bob")
    );
    assert_eq!(
        first_user_message(&pool, "agent-carol").await,
        None,
        "no broadcast when mentions are present"
    );

    let history = room.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].mentions, vec!["alice".to_string(), "bob".to_string()]);
}

#[tokio::test]
async fn broadcast_excludes_the_sender() {
    let (pool, room) = room_with_members(&["alice", "bob", "carol"]).await;

    room.say("alice", "hello team", &CancelToken::new())
        .await
        .expect("say");

    assert_eq!(first_user_message(&pool, "agent-alice").await, None);
    assert_eq!(
        first_user_message(&pool, "agent-bob").await.as_deref(),
        Some("[from:alice] hello team")
    );
    assert_eq!(
        first_user_message(&pool, "agent-carol").await.as_deref(),
        Some("[from:alice] hello team")
    );
    assert_eq!(room.history().len(), 1);
}

#[tokio::test]
async fn whisper_reaches_exactly_one_member() {
    let (pool, room) = room_with_members(&["alice", "bob"]).await;

    room.whisper("alice", "bob", "psst", &CancelToken::new())
        .await
        .expect("whisper");

    assert_eq!(
        first_user_message(&pool, "agent-bob").await.as_deref(),
        Some("[whisper from:alice] psst")
    );
    assert_eq!(first_user_message(&pool, "agent-alice").await, None);
}

#[tokio::test]
async fn whisper_to_unknown_member_fails() {
    let (_pool, room) = room_with_members(&["alice"]).await;
    let err = room
        .whisper("alice", "nobody", "hello?", &CancelToken::new())
        .await
        .expect_err("unknown member");
    assert_eq!(err.error_code(), "KEY_NOT_FOUND");
}

#[tokio::test]
async fn departed_agents_are_silently_skipped() {
    let (pool, room) = room_with_members(&["alice", "bob", "carol"]).await;
    pool.remove("agent-bob").await;

    // Membership does not prolong agent life; delivery just skips bob.
    room.say("alice", "anyone there?", &CancelToken::new())
        .await
        .expect("say succeeds despite the gone member");
    assert_eq!(
        first_user_message(&pool, "agent-carol").await.as_deref(),
        Some("[from:alice] anyone there?")
    );
}

#[tokio::test]
async fn leave_removes_membership() {
    let (pool, room) = room_with_members(&["alice", "bob"]).await;
    assert!(room.leave("bob"));
    assert!(!room.leave("bob"));

    room.say("alice", "still here?", &CancelToken::new())
        .await
        .expect("say");
    assert_eq!(first_user_message(&pool, "agent-bob").await, None);
    assert_eq!(room.members(), vec!["alice".to_string()]);
}
