use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;

use autowriter_core::{
    CompletionClient, GenerationError, GenerationInput, GenerationRequest, GenerationResponse,
    GenerationStage, LogLevel, NovelDocument, NovelService, PromptComposer, PromptError,
    PromptRegistry, Role, VecLogSink,
};
use tempfile::tempdir;

/// Replays a fixed script of replies. `None` stands for a call that spent all
/// of its attempts.
struct ScriptedClient {
    replies: Mutex<VecDeque<Option<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    attempt_budgets: Mutex<Vec<usize>>,
}

impl ScriptedClient {
    fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<&'static str>>,
    {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|reply| reply.map(str::to_string))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
            attempt_budgets: Mutex::new(Vec::new()),
        }
    }

    /// `max_attempts` passed with each call, in order.
    fn attempt_budgets(&self) -> Vec<usize> {
        self.attempt_budgets
            .lock()
            .expect("budgets mutex poisoned")
            .clone()
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests mutex poisoned").clone()
    }

    fn assert_empty(&self) {
        let guard = self.replies.lock().expect("replies mutex poisoned");
        assert!(guard.is_empty(), "expected every scripted reply to be used");
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(
        &self,
        request: &GenerationRequest,
        max_attempts: usize,
    ) -> Option<GenerationResponse> {
        self.attempt_budgets
            .lock()
            .expect("budgets mutex poisoned")
            .push(max_attempts);
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies mutex poisoned")
            .pop_front()
            .flatten()
            .map(|content| GenerationResponse::new(content, 1))
    }
}

fn input() -> GenerationInput {
    GenerationInput::new("你是一名都市言情作家。", "雨下了一整夜。")
}

#[test]
fn failed_outline_stops_the_run() {
    let prompts = PromptRegistry::new().expect("prompts");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink);
    let client = ScriptedClient::new([None]);

    let result = service.run(&client, &input(), "写一个故事", 3);

    match result {
        Err(GenerationError::StageFailed { stage }) => assert_eq!(stage, GenerationStage::Outline),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(client.requests().len(), 1);
    assert!(sink.contains(LogLevel::Error, "大纲生成失败"));
}

#[test]
fn failed_title_uses_fallback_and_keeps_chapters() {
    let prompts = PromptRegistry::new().expect("prompts");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink)
        .with_fallback_title("备用标题");
    let client = ScriptedClient::new([
        Some("## 大纲\n一句话：重逢。"),
        None,
        Some("清晨的正文。"),
        Some("午后的正文。"),
        Some("夜晚的正文。"),
    ]);

    let draft = service
        .run(&client, &input(), "写一个故事", 3)
        .expect("draft");

    assert_eq!(draft.title(), "备用标题");
    assert_eq!(draft.outline(), "大纲\n一句话：重逢。");
    assert_eq!(
        draft.chapters(),
        ["清晨的正文。", "午后的正文。", "夜晚的正文。"]
    );
    assert!(draft.failed_chapters().is_empty());
    assert!(sink.contains(LogLevel::Warn, "使用默认标题"));
    client.assert_empty();
}

#[test]
fn failed_chapter_leaves_an_empty_slot() {
    let prompts = PromptRegistry::new().expect("prompts");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink);
    let client = ScriptedClient::new([
        Some("大纲内容"),
        Some("《雨夜》"),
        Some("**开端**正文。"),
        None,
        Some("结局正文。"),
    ]);

    let draft = service
        .run(&client, &input(), "写一个故事", 3)
        .expect("draft");

    assert_eq!(draft.title(), "雨夜");
    assert_eq!(draft.chapters(), ["开端正文。", "", "结局正文。"]);
    assert_eq!(draft.failed_chapters(), vec![2]);
    assert!(sink.contains(LogLevel::Warn, "第2章生成失败"));

    let document = NovelDocument::from(&draft);
    assert_eq!(document.title, "雨夜");
    assert!(document.body.contains("开端正文。\n\n结局正文。"));
    client.assert_empty();
}

#[test]
fn chapter_prompts_use_outline_not_previous_chapters() {
    let prompts = PromptRegistry::new().expect("prompts");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink);
    let client = ScriptedClient::new([
        Some("大纲：两个人在雨中相遇。"),
        Some("标题"),
        Some("CHAPTER_ONE_MARKER"),
        Some("CHAPTER_TWO_MARKER"),
    ]);

    service
        .run(&client, &input(), "写一个故事", 2)
        .expect("draft");

    let requests = client.requests();
    assert_eq!(requests.len(), 4);

    let outline_user = requests[0].content_of(Role::User).expect("user");
    assert_eq!(
        requests[0].content_of(Role::System),
        Some("你是一名都市言情作家。")
    );
    assert!(outline_user.contains("写一个故事"));
    assert!(outline_user.contains("雨下了一整夜。"));

    assert!(requests[1]
        .content_of(Role::User)
        .expect("user")
        .contains("两个人在雨中相遇"));

    let second_chapter = requests[3].content_of(Role::User).expect("user");
    assert!(second_chapter.contains("两个人在雨中相遇"));
    assert!(!second_chapter.contains("CHAPTER_ONE_MARKER"));
    assert!(second_chapter.contains("第2章（共2章）"));
}

#[test]
fn blank_reply_after_cleanup_counts_as_failure() {
    let prompts = PromptRegistry::new().expect("prompts");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink);
    let client = ScriptedClient::new([Some("大纲"), Some("标题"), Some("---\n\n===")]);

    let draft = service
        .run(&client, &input(), "写一个故事", 1)
        .expect("draft");

    assert_eq!(draft.chapters(), [""]);
    assert_eq!(draft.failed_chapters(), vec![1]);
}

#[test]
fn zero_chapters_is_rejected_before_any_call() {
    let prompts = PromptRegistry::new().expect("prompts");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink);
    let client = ScriptedClient::new([]);

    assert!(matches!(
        service.run(&client, &input(), "写一个故事", 0),
        Err(GenerationError::InvalidChapterCount)
    ));
    assert!(client.requests().is_empty());
}

#[test]
fn configured_attempt_budget_reaches_every_stage() {
    let prompts = PromptRegistry::new().expect("prompts");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink).with_max_attempts(3);
    let client = ScriptedClient::new([
        Some("大纲"),
        None,
        Some("清晨的正文。"),
        Some("夜晚的正文。"),
    ]);

    service
        .run(&client, &input(), "写一个故事", 2)
        .expect("draft");

    assert_eq!(client.attempt_budgets(), vec![3, 3, 3, 3]);
    client.assert_empty();
}

#[test]
fn zero_attempt_budget_still_tries_once() {
    let prompts = PromptRegistry::new().expect("prompts");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink).with_max_attempts(0);
    let client = ScriptedClient::new([Some("大纲"), Some("标题"), Some("正文。")]);

    service
        .run(&client, &input(), "写一个故事", 1)
        .expect("draft");

    assert_eq!(client.attempt_budgets(), vec![1, 1, 1]);
}

fn registry_with_override(key: &str, template: &str) -> (tempfile::TempDir, PromptRegistry) {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join("custom.toml"),
        format!("[prompts.{key}]\ntemplate = \"{template}\"\n"),
    )
    .expect("write override");
    let prompts = PromptRegistry::with_custom_directories(&[dir.path()]).expect("prompts");
    (dir, prompts)
}

#[test]
fn chapter_template_with_unknown_argument_fails_before_any_call() {
    let (_dir, prompts) =
        registry_with_override("chapter_request", "写第{chapter_number}章，风格{style}");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink);
    let client = ScriptedClient::new([
        Some("大纲"),
        Some("标题"),
        Some("一"),
        Some("二"),
        Some("三"),
    ]);

    let result = service.run(&client, &input(), "写一个故事", 3);

    match result {
        Err(GenerationError::Prompt {
            stage,
            source: PromptError::MissingArgument { key, argument },
        }) => {
            assert_eq!(stage, GenerationStage::Chapter(1));
            assert_eq!(key, "chapter_request");
            assert_eq!(argument, "style");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(client.requests().is_empty());
    assert!(sink.contains(LogLevel::Error, "提示词模板无效"));
}

#[test]
fn title_template_with_unknown_argument_fails_before_any_call() {
    let (_dir, prompts) =
        registry_with_override("title_request", "给{outline}起名，语气{tone}");
    let sink = VecLogSink::new();
    let service = NovelService::new(PromptComposer::new(&prompts), &sink);
    let client = ScriptedClient::new([Some("大纲"), Some("标题"), Some("正文。")]);

    let result = service.run(&client, &input(), "写一个故事", 1);

    assert!(matches!(
        result,
        Err(GenerationError::Prompt {
            stage: GenerationStage::Title,
            ..
        })
    ));
    assert!(client.requests().is_empty());
}
