// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end review pipeline tests with a scripted in-process client.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use coderev::cancel::CancelToken;
use coderev::config::RagSettings;
use coderev::error::ProviderError;
use coderev::llm::{ClientFactory, ProviderKind};
use coderev::rag::RagService;
use coderev::review::{Orchestrator, ReviewOptions, ReviewOutcome};
use coderev::store::{
    IssueType, ReviewRepo, ReviewStatus, Severity, SqliteStore, Store, WorkspaceRepo,
};
use coderev::types::{
    ChatRequest, ChatResponse, ChatStream, CompletionRequest, LlmClient, SharedClient,
};
use coderev::vector::store::SqliteVectorStore;

const NO_ISSUES_REPLY: &str =
    r#"{"summary":"No issues found","issues":[],"overall_assessment":"Code is well-written"}"#;

/// Client that returns scripted chat replies and deterministic embeddings.
struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    chat_calls: AtomicUsize,
    embed_calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            chat_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        })
    }

    fn embedding_for(text: &str) -> Vec<f32> {
        let sum: u32 = text.bytes().map(u32::from).sum();
        vec![
            1.0,
            (sum % 13) as f32 / 13.0,
            (sum % 7) as f32 / 7.0,
            (sum % 3) as f32 / 3.0,
        ]
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn generate_chat(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| NO_ISSUES_REPLY.to_string());
        Ok(ChatResponse::full(reply, "scripted-model"))
    }

    async fn generate_chat_stream(&self, _: &ChatRequest) -> Result<ChatStream, ProviderError> {
        unimplemented!("pipeline tests use non-streaming chat")
    }

    async fn generate_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatResponse, ProviderError> {
        self.generate_chat(&request.clone().into_chat()).await
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::embedding_for(text))
    }

    async fn batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embedding_for(t)).collect())
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

struct Pipeline {
    _workspace_dir: TempDir,
    store: Arc<SqliteStore>,
    orchestrator: Orchestrator,
    client: Arc<ScriptedClient>,
    files: Vec<PathBuf>,
    cancel: CancelToken,
    workspace_id: String,
}

/// A well-formed 20-line Go file.
const GO_SOURCE: &str = r#"package main

import "fmt"

const greeting = "hello"

type Greeter struct {
	Name string
}

func (g *Greeter) Greet() string {
	return greeting + ", " + g.Name
}

func main() {
	g := Greeter{Name: "world"}
	fmt.Println(g.Greet())
}

// end
"#;

fn pipeline_with(replies: Vec<&str>, sources: &[(&str, &str)]) -> Pipeline {
    let workspace_dir = tempfile::tempdir().unwrap();
    let mut files = Vec::new();
    for (name, content) in sources {
        let path = workspace_dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        files.push(path);
    }

    let client = ScriptedClient::new(replies);

    let mut clients: HashMap<ProviderKind, SharedClient> = HashMap::new();
    clients.insert(ProviderKind::Ollama, client.clone() as SharedClient);
    let factory = Arc::new(ClientFactory::from_clients(clients, ProviderKind::Ollama));

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let workspace = store
        .ensure_workspace(&workspace_dir.path().to_string_lossy(), "test-repo")
        .unwrap();

    let vectors = Arc::new(SqliteVectorStore::new(store.connection()));
    let settings = RagSettings::default();
    let rag = Arc::new(RagService::new(
        client.clone() as SharedClient,
        vectors,
        settings.clone(),
    ));

    let cancel = CancelToken::new();
    let workspace_id = workspace.id.clone();
    let orchestrator = Orchestrator::new(
        store.clone() as Arc<dyn Store>,
        rag,
        factory,
        workspace,
        settings,
        cancel.clone(),
    )
    .unwrap();

    Pipeline {
        _workspace_dir: workspace_dir,
        workspace_id,
        store,
        orchestrator,
        client,
        files,
        cancel,
    }
}

async fn run(pipeline: &Pipeline) -> ReviewOutcome {
    pipeline
        .orchestrator
        .run(ReviewOptions::staged(pipeline.files.clone()))
        .await
        .unwrap()
}

#[tokio::test]
async fn no_issues_review_completes_clean() {
    let pipeline = pipeline_with(vec![NO_ISSUES_REPLY], &[("main.go", GO_SOURCE)]);
    let outcome = run(&pipeline).await;

    assert_eq!(outcome.review.status, ReviewStatus::Completed);
    assert!(outcome.review.completed_at.is_some());
    assert!(outcome.issues.is_empty());
    assert_eq!(outcome.summary.files_reviewed, 1);
    assert_eq!(outcome.summary.total_issues, 0);
}

#[tokio::test]
async fn one_structured_issue_is_persisted() {
    let reply = r#"{"summary":"Found a bug","issues":[{
        "type":"bug","severity":"medium","title":"Greeting concatenation",
        "description":"String concatenation in a hot path",
        "suggestion":"Use fmt.Sprintf",
        "affected_code":"return greeting + \", \" + g.Name",
        "code_snippet":"return fmt.Sprintf(\"%s, %s\", greeting, g.Name)",
        "line_start":10,"line_end":12
    }],"overall_assessment":"Mostly fine"}"#;

    let pipeline = pipeline_with(vec![reply], &[("main.go", GO_SOURCE)]);
    let outcome = run(&pipeline).await;

    assert_eq!(outcome.issues.len(), 1);
    let issue = &outcome.issues[0];
    assert_eq!(issue.issue_type, IssueType::Bug);
    assert_eq!(issue.severity, Severity::Medium);
    assert_eq!(issue.line_start, 10);
    assert_eq!(issue.line_end, 12);
    assert!(!issue.is_valid, "issues start unaccepted");

    // The per-file record carries the count.
    let persisted = pipeline.store.issues_for_review(&outcome.review.id).unwrap();
    assert_eq!(persisted.len(), 1);
}

#[tokio::test]
async fn prose_around_json_is_tolerated() {
    let reply = "Here is my review:\n{\"summary\":\"x\",\"issues\":[],\"overall_assessment\":\"ok\"}\nThanks.";
    let pipeline = pipeline_with(vec![reply], &[("main.go", GO_SOURCE)]);
    let outcome = run(&pipeline).await;

    assert_eq!(outcome.review.status, ReviewStatus::Completed);
    assert!(outcome.issues.is_empty());
    assert_eq!(outcome.summary.files_reviewed, 1);
}

#[tokio::test]
async fn unparseable_reply_records_zero_issue_file() {
    let pipeline = pipeline_with(
        vec!["I couldn't find the file, sorry."],
        &[("main.go", GO_SOURCE)],
    );
    let outcome = run(&pipeline).await;

    // Parse failure is a warning, not a review failure.
    assert_eq!(outcome.review.status, ReviewStatus::Completed);
    assert_eq!(outcome.summary.files_reviewed, 1);
    assert_eq!(outcome.summary.total_issues, 0);
}

#[tokio::test]
async fn empty_file_list_completes_with_zero_issues() {
    let pipeline = pipeline_with(vec![], &[]);
    let outcome = run(&pipeline).await;

    assert_eq!(outcome.review.status, ReviewStatus::Completed);
    assert!(outcome.issues.is_empty());
    assert_eq!(pipeline.client.chat_calls.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.client.embed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_review_skips_embedded_chunks() {
    let pipeline = pipeline_with(
        vec![NO_ISSUES_REPLY, NO_ISSUES_REPLY],
        &[("main.go", GO_SOURCE)],
    );

    run(&pipeline).await;
    let embed_calls_after_first = pipeline.client.embed_calls.load(Ordering::SeqCst);

    run(&pipeline).await;
    let embed_calls_after_second = pipeline.client.embed_calls.load(Ordering::SeqCst);

    // The second pass re-embeds nothing; only the per-file context query
    // issues an embedding call.
    assert_eq!(embed_calls_after_second - embed_calls_after_first, 1);
}

#[tokio::test]
async fn multiple_files_each_get_review_files() {
    let other_go = "package main\n\nfunc helper() int {\n\treturn 42\n}\n";
    let pipeline = pipeline_with(
        vec![NO_ISSUES_REPLY, NO_ISSUES_REPLY],
        &[("main.go", GO_SOURCE), ("helper.go", other_go)],
    );
    let outcome = run(&pipeline).await;

    assert_eq!(outcome.summary.files_reviewed, 2);
    assert_eq!(pipeline.client.chat_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancelled_review_stays_in_progress() {
    let pipeline = pipeline_with(vec![NO_ISSUES_REPLY], &[("main.go", GO_SOURCE)]);
    pipeline.cancel.cancel();

    let err = pipeline
        .orchestrator
        .run(ReviewOptions::staged(pipeline.files.clone()))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    // The review row exists and stays in progress - cancellation is not
    // failure.
    let review = pipeline
        .store
        .latest_review_for_workspace(&pipeline.workspace_id)
        .unwrap()
        .expect("review row was created");
    assert_eq!(review.status, ReviewStatus::InProgress);
    assert_eq!(pipeline.client.chat_calls.load(Ordering::SeqCst), 0);
}
