//! End-to-end dispatch: routing, fallback, streaming, embeddings
//!
//! Drives `LlmRouter` against real Postgres rows and mock upstream
//! servers. All tests skip when `SCRIBE_TEST_DATABASE_URL` is unset.

mod harness;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::StreamExt;
use harness::db;
use harness::mock_llm::MockLlm;
use scribe_catalog::{CredentialResolver, ProviderRegistry, SaveCredential};
use scribe_llm::{DispatchError, HttpCompletionClient, LlmRouter, StreamEvent, TaskCall};
use scribe_routing::{FieldUpdate, ModelRouter, RoutingUpdate};

struct Stack {
    registry: Arc<ProviderRegistry>,
    credentials: Arc<CredentialResolver>,
    router: Arc<ModelRouter>,
    llm: LlmRouter,
}

fn build_stack(pool: sqlx::PgPool) -> Stack {
    let registry = Arc::new(ProviderRegistry::new(pool.clone()));
    let credentials = Arc::new(CredentialResolver::new(
        pool.clone(),
        "test-shared-secret",
        HashMap::new(),
    ));
    let router = Arc::new(ModelRouter::new(
        pool,
        Arc::clone(&registry),
        Arc::clone(&credentials),
    ));
    let llm = LlmRouter::new(
        Arc::clone(&router),
        Arc::new(HttpCompletionClient::new()),
        scribe_config::LlmConfig::default(),
    );

    Stack {
        registry,
        credentials,
        router,
        llm,
    }
}

async fn seed_credential(stack: &Stack, provider_code: &str) {
    stack
        .credentials
        .save_credential(SaveCredential {
            provider_code: provider_code.to_owned(),
            api_key: "sk-dispatch-test-key".to_owned(),
            user_id: None,
            name: None,
            base_url_override: None,
            is_default: true,
            extra_config: None,
        })
        .await
        .unwrap();
}

fn call_for(task: &str, content: &str) -> TaskCall {
    let mut variables = BTreeMap::new();
    variables.insert("content".to_owned(), content.to_owned());

    TaskCall {
        variables,
        task_alias: task.to_owned(),
        user_id: None,
        custom_prompt: None,
        model_id: None,
        provider_code: None,
    }
}

#[tokio::test]
async fn routed_request_dispatches_with_openai_prefix() {
    let Some(pool) = db::test_pool().await else { return };
    let stack = build_stack(pool.clone());

    let upstream = MockLlm::start("a fine summary").await.unwrap();
    let provider = db::seed_provider(&stack.registry, Some(&upstream.base_url())).await;
    seed_credential(&stack, &provider.code).await;

    let model_id = db::unique("mdl");
    let model = db::seed_model(&stack.registry, &provider.code, &model_id).await;

    let task = db::seed_task_type(&pool, Some("Summarize: {content}")).await;
    stack
        .router
        .update_routing(
            &task,
            None,
            RoutingUpdate {
                primary_model_id: FieldUpdate::Set(model.id),
                ..RoutingUpdate::default()
            },
        )
        .await
        .unwrap();

    let outcome = stack.llm.chat(&call_for(&task, "the post body")).await.unwrap();

    assert_eq!(outcome.content, "a fine summary");
    assert_eq!(outcome.model, format!("openai/{model_id}"));
    assert_eq!(outcome.tokens_in, Some(10));
    assert_eq!(outcome.tokens_out, Some(5));
    assert_eq!(upstream.completion_count(), 1);
}

#[tokio::test]
async fn failed_primary_retries_exactly_once_on_fallback() {
    let Some(pool) = db::test_pool().await else { return };
    let stack = build_stack(pool.clone());

    let failing = MockLlm::start_always_failing().await.unwrap();
    let healthy = MockLlm::start("fallback says hi").await.unwrap();

    let primary_provider = db::seed_provider(&stack.registry, Some(&failing.base_url())).await;
    let fallback_provider = db::seed_provider(&stack.registry, Some(&healthy.base_url())).await;
    seed_credential(&stack, &primary_provider.code).await;
    seed_credential(&stack, &fallback_provider.code).await;

    let primary_id = db::unique("mdl");
    let fallback_id = db::unique("mdl");
    let primary = db::seed_model(&stack.registry, &primary_provider.code, &primary_id).await;
    let fallback = db::seed_model(&stack.registry, &fallback_provider.code, &fallback_id).await;

    let task = db::seed_task_type(&pool, None).await;
    stack
        .router
        .update_routing(
            &task,
            None,
            RoutingUpdate {
                primary_model_id: FieldUpdate::Set(primary.id),
                fallback_model_id: FieldUpdate::Set(fallback.id),
                ..RoutingUpdate::default()
            },
        )
        .await
        .unwrap();

    let outcome = stack.llm.chat(&call_for(&task, "hello")).await.unwrap();

    assert_eq!(outcome.content, "fallback says hi");
    assert_eq!(outcome.model, format!("openai/{fallback_id}"));
    assert_eq!(failing.completion_count(), 1, "primary attempted once");
    assert_eq!(healthy.completion_count(), 1, "fallback attempted once");
}

#[tokio::test]
async fn explicit_override_never_falls_back() {
    let Some(pool) = db::test_pool().await else { return };
    let stack = build_stack(pool.clone());

    let failing = MockLlm::start_always_failing().await.unwrap();
    let healthy = MockLlm::start("should never be used").await.unwrap();

    let primary_provider = db::seed_provider(&stack.registry, Some(&failing.base_url())).await;
    let fallback_provider = db::seed_provider(&stack.registry, Some(&healthy.base_url())).await;
    seed_credential(&stack, &primary_provider.code).await;
    seed_credential(&stack, &fallback_provider.code).await;

    let primary_id = db::unique("mdl");
    let fallback_id = db::unique("mdl");
    let primary = db::seed_model(&stack.registry, &primary_provider.code, &primary_id).await;
    let fallback = db::seed_model(&stack.registry, &fallback_provider.code, &fallback_id).await;

    // Routing with a configured fallback exists, but the caller names
    // the model explicitly
    let task = db::seed_task_type(&pool, None).await;
    stack
        .router
        .update_routing(
            &task,
            None,
            RoutingUpdate {
                primary_model_id: FieldUpdate::Set(primary.id),
                fallback_model_id: FieldUpdate::Set(fallback.id),
                ..RoutingUpdate::default()
            },
        )
        .await
        .unwrap();

    let mut call = call_for(&task, "hello");
    call.model_id = Some(primary_id.clone());
    call.provider_code = Some(primary_provider.code.clone());

    let err = stack.llm.chat(&call).await.unwrap_err();

    assert!(matches!(err, DispatchError::Upstream(_)));
    assert_eq!(failing.completion_count(), 1, "single attempt, no retry");
    assert_eq!(healthy.completion_count(), 0, "fallback never touched");
}

#[tokio::test]
async fn unknown_override_is_caller_visible() {
    let Some(pool) = db::test_pool().await else { return };
    let stack = build_stack(pool.clone());

    let mut call = call_for("summary", "hello");
    call.model_id = Some(db::unique("no-such-model"));

    let err = stack.llm.chat(&call).await.unwrap_err();
    assert!(matches!(err, DispatchError::ModelNotFound { .. }));
}

#[tokio::test]
async fn streamed_response_splits_think_from_answer() {
    let Some(pool) = db::test_pool().await else { return };
    let stack = build_stack(pool.clone());

    let upstream = MockLlm::start("<think>hidden-reasoning</think> visible answer").await.unwrap();
    let provider = db::seed_provider(&stack.registry, Some(&upstream.base_url())).await;
    seed_credential(&stack, &provider.code).await;

    let model_id = db::unique("mdl");
    let model = db::seed_model(&stack.registry, &provider.code, &model_id).await;

    let task = db::seed_task_type(&pool, None).await;
    stack
        .router
        .update_routing(
            &task,
            None,
            RoutingUpdate {
                primary_model_id: FieldUpdate::Set(model.id),
                ..RoutingUpdate::default()
            },
        )
        .await
        .unwrap();

    let (model_used, stream) = stack
        .llm
        .stream_chat_with_think_detection(&call_for(&task, "hello"))
        .await;
    let events: Vec<StreamEvent> = stream.collect().await;

    assert_eq!(model_used, Some(format!("openai/{model_id}")));
    assert_eq!(events.last(), Some(&StreamEvent::Done));

    let mut think_text = String::new();
    let mut answer_text = String::new();
    for event in &events {
        if let StreamEvent::Delta { content, is_think } = event {
            if *is_think {
                think_text.push_str(content);
            } else {
                answer_text.push_str(content);
            }
        }
    }

    assert_eq!(think_text, "hidden-reasoning");
    assert_eq!(answer_text.trim(), "visible answer");
}

#[tokio::test]
async fn embeddings_use_the_embedding_routing() {
    let Some(pool) = db::test_pool().await else { return };
    let stack = build_stack(pool.clone());

    let upstream = MockLlm::start("unused").await.unwrap();
    let provider = db::seed_provider(&stack.registry, Some(&upstream.base_url())).await;
    seed_credential(&stack, &provider.code).await;

    let model_id = db::unique("emb");
    let model = db::seed_model(&stack.registry, &provider.code, &model_id).await;

    // The embedding task type is shared; create it once, idempotently
    sqlx::query(
        "INSERT INTO ai_task_types (code, name, default_model_type) \
         VALUES ('embedding', 'Embedding', 'embedding') \
         ON CONFLICT (code) DO NOTHING",
    )
    .execute(&pool)
    .await
    .unwrap();

    stack
        .router
        .update_routing(
            "embedding",
            None,
            RoutingUpdate {
                primary_model_id: FieldUpdate::Set(model.id),
                ..RoutingUpdate::default()
            },
        )
        .await
        .unwrap();

    let vector = stack.llm.embed("some text", None).await.unwrap();

    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    assert_eq!(upstream.embedding_count(), 1);
}
