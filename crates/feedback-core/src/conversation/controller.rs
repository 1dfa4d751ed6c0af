use std::future::{Future, pending};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::heuristics::is_short_answer;
use super::prompt::{FOLLOW_UP_SYSTEM_PROMPT, build_follow_up_prompt};
use super::sentinel::{FollowUpTurnResult, decode_reply};
use super::{ConversationThread, TerminalReason};
use crate::llm::{LlmGateway, LlmGatewayRequest, generate_with_telemetry, log_telemetry};
use crate::models::{Feedback, FeedbackType};
use crate::question_hash::hash_question;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("conversation thread already ended ({0:?})")]
    AlreadyTerminal(TerminalReason),
    #[error("answer must not be empty")]
    EmptyAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedConversation {
    pub reason: TerminalReason,
    pub thread: ConversationThread,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Back to awaiting a response, with one follow-up spent.
    FollowUp {
        question: String,
        thread: ConversationThread,
    },
    Complete(CompletedConversation),
    /// The caller went away mid-invocation. Nothing was applied.
    Cancelled,
}

/// Where a finished conversation is filed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackTarget {
    pub presentation_id: String,
    pub slide_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
}

/// Drives one thread a turn at a time. Holds no per-thread state, so a
/// single controller serves any number of independent threads.
#[derive(Clone)]
pub struct ConversationController {
    llm_gateway: Arc<dyn LlmGateway>,
    short_answer_chars: usize,
}

impl ConversationController {
    pub fn new(llm_gateway: Arc<dyn LlmGateway>, short_answer_chars: usize) -> Self {
        Self {
            llm_gateway,
            short_answer_chars,
        }
    }

    pub async fn submit_answer(
        &self,
        thread: &ConversationThread,
        answer: &str,
    ) -> Result<TurnOutcome, ConversationError> {
        self.submit_answer_until(thread, answer, None, pending()).await
    }

    /// Like [`Self::submit_answer`], tagging the model request with the
    /// reviewer's session so provider-side abuse tracking can group calls.
    pub async fn submit_answer_as(
        &self,
        thread: &ConversationThread,
        answer: &str,
        session_id: &str,
    ) -> Result<TurnOutcome, ConversationError> {
        self.submit_answer_until(thread, answer, Some(session_id), pending())
            .await
    }

    /// Runs one turn, abandoning it if `cancelled` resolves first. The
    /// caller's thread is never modified; on `FollowUp` or `Complete` the
    /// caller replaces it with the returned one.
    pub async fn submit_answer_until<C>(
        &self,
        thread: &ConversationThread,
        answer: &str,
        requester_id: Option<&str>,
        cancelled: C,
    ) -> Result<TurnOutcome, ConversationError>
    where
        C: Future<Output = ()>,
    {
        if let Some(reason) = thread.terminal_reason() {
            return Err(ConversationError::AlreadyTerminal(reason));
        }
        if answer.trim().is_empty() {
            return Err(ConversationError::EmptyAnswer);
        }

        let prior_history = thread.history();
        let mut next = thread.clone();
        next.push_user(answer);

        if next.remaining_follow_ups() == 0 {
            debug!("follow-up budget exhausted; closing thread without model call");
            return Ok(complete(next, TerminalReason::MaxReached));
        }

        let context = self.context_with_hints(thread.context_summary(), answer);
        let prompt = build_follow_up_prompt(
            thread.primary_question(),
            context.as_deref(),
            answer.trim(),
            prior_history,
            next.remaining_follow_ups(),
        );
        let mut request = LlmGatewayRequest::new(FOLLOW_UP_SYSTEM_PROMPT, prompt);
        if let Some(requester_id) = requester_id {
            request = request.with_requester_id(requester_id);
        }

        let invocation = generate_with_telemetry(self.llm_gateway.as_ref(), request);
        let (llm_result, telemetry) = tokio::select! {
            biased;
            _ = cancelled => {
                debug!("follow-up turn cancelled before the model replied");
                return Ok(TurnOutcome::Cancelled);
            }
            result = invocation => result,
        };
        log_telemetry(&telemetry, "feedback_follow_up");

        let reply = match llm_result {
            Ok(response) => response.text,
            Err(err) => {
                warn!("follow-up model request failed: {err}");
                return Ok(complete(next, TerminalReason::Error));
            }
        };

        match decode_reply(&reply) {
            Ok(FollowUpTurnResult::Complete) => Ok(complete(next, TerminalReason::Comprehensive)),
            Ok(FollowUpTurnResult::FollowUpQuestion(question)) => {
                next.push_follow_up(question.clone());
                Ok(TurnOutcome::FollowUp {
                    question,
                    thread: next,
                })
            }
            Err(err) => {
                warn!("follow-up model reply rejected: {err}");
                Ok(complete(next, TerminalReason::Error))
            }
        }
    }

    /// Ends the thread on the reviewer's say-so, recording their final
    /// answer. The model is not consulted.
    pub fn close_by_reviewer(
        &self,
        thread: &ConversationThread,
        answer: &str,
    ) -> Result<CompletedConversation, ConversationError> {
        if let Some(reason) = thread.terminal_reason() {
            return Err(ConversationError::AlreadyTerminal(reason));
        }

        let mut next = thread.clone();
        if !answer.trim().is_empty() {
            next.push_user(answer);
        }
        next.terminate(TerminalReason::UserDone);
        Ok(CompletedConversation {
            reason: TerminalReason::UserDone,
            thread: next,
        })
    }

    fn context_with_hints(&self, context_summary: Option<&str>, answer: &str) -> Option<String> {
        if !is_short_answer(answer, self.short_answer_chars) {
            return context_summary.map(ToString::to_string);
        }

        let hint = format!(
            "The latest response is brief ({} characters); a follow-up is more likely to be useful.",
            answer.trim().chars().count()
        );
        Some(match context_summary {
            Some(summary) => format!("{summary}\n{hint}"),
            None => hint,
        })
    }
}

fn complete(mut thread: ConversationThread, reason: TerminalReason) -> TurnOutcome {
    thread.terminate(reason);
    TurnOutcome::Complete(CompletedConversation { reason, thread })
}

/// Builds the record persisted for a finished thread.
pub fn finalize_feedback(
    completed: &CompletedConversation,
    target: &FeedbackTarget,
    session_id: &str,
) -> Feedback {
    let thread = &completed.thread;
    let feedback_type = if thread.assistant_turns() > 0 {
        FeedbackType::Conversation
    } else {
        FeedbackType::Text
    };

    Feedback {
        id: None,
        presentation_id: target.presentation_id.clone(),
        slide_id: target.slide_id.clone(),
        feedback_type,
        form_id: target.form_id.clone(),
        session_id: session_id.to_string(),
        question_hash: hash_question(thread.primary_question()),
        response_text: thread.transcript(),
        timestamp: Utc::now(),
        conversation: Some(thread.history().to_vec()),
        terminal_reason: Some(completed.reason),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::sync::oneshot;

    use super::{
        CompletedConversation, ConversationController, ConversationError, FeedbackTarget,
        TurnOutcome, finalize_feedback,
    };
    use crate::conversation::{ConversationThread, MessageRole, TerminalReason};
    use crate::llm::{
        LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    };
    use crate::models::FeedbackType;
    use crate::question_hash::hash_question;

    enum ScriptedReply {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct ScriptedGateway {
        replies: Mutex<VecDeque<ScriptedReply>>,
        prompts: Mutex<Vec<String>>,
        requesters: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<ScriptedReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from(replies)),
                prompts: Mutex::new(Vec::new()),
                requesters: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().expect("prompt log lock").len()
        }

        fn last_prompt(&self) -> String {
            self.prompts
                .lock()
                .expect("prompt log lock")
                .last()
                .cloned()
                .unwrap_or_default()
        }
    }

    impl LlmGateway for ScriptedGateway {
        fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
            Box::pin(async move {
                self.requesters
                    .lock()
                    .expect("requester log lock")
                    .push(request.requester_id);
                self.prompts
                    .lock()
                    .expect("prompt log lock")
                    .push(request.prompt);
                let reply = self
                    .replies
                    .lock()
                    .expect("reply script lock")
                    .pop_front()
                    .unwrap_or(ScriptedReply::Fail);
                match reply {
                    ScriptedReply::Text(text) => Ok(LlmGatewayResponse {
                        model: "scripted".to_string(),
                        provider_request_id: None,
                        text: text.to_string(),
                        usage: None,
                    }),
                    ScriptedReply::Fail => Err(LlmGatewayError::ProviderFailure(
                        "status=503 code=overloaded".to_string(),
                    )),
                    ScriptedReply::Hang => std::future::pending().await,
                }
            })
        }
    }

    fn controller(gateway: &Arc<ScriptedGateway>) -> ConversationController {
        ConversationController::new(gateway.clone(), 40)
    }

    fn expect_follow_up(outcome: TurnOutcome) -> (String, ConversationThread) {
        match outcome {
            TurnOutcome::FollowUp { question, thread } => (question, thread),
            other => panic!("expected follow-up, got {other:?}"),
        }
    }

    fn expect_complete(outcome: TurnOutcome) -> CompletedConversation {
        match outcome {
            TurnOutcome::Complete(completed) => completed,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_conversation_ends_after_two_answers_and_one_follow_up() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedReply::Text("What specifically felt fine about it?"),
            ScriptedReply::Text("CONVERSATION_COMPLETE"),
        ]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("What did you think?", None, 2);

        let (question, thread) = expect_follow_up(
            controller
                .submit_answer(&thread, "fine")
                .await
                .expect("open thread"),
        );
        assert_eq!(question, "What specifically felt fine about it?");
        assert_eq!(thread.remaining_follow_ups(), 1);
        assert!(gateway.last_prompt().contains("No previous exchanges."));
        assert!(gateway.last_prompt().contains("The latest response is brief"));

        let completed = expect_complete(
            controller
                .submit_answer(
                    &thread,
                    "The examples mapped directly onto our rollout plan and the diagrams were easy to follow.",
                )
                .await
                .expect("open thread"),
        );
        assert!(gateway.last_prompt().contains("User: fine"));
        assert!(gateway.last_prompt().contains("You may ask 1 more follow-up question"));

        assert_eq!(completed.reason, TerminalReason::Comprehensive);
        assert_eq!(completed.thread.user_turns(), 2);
        assert_eq!(completed.thread.assistant_turns(), 1);
        assert_eq!(completed.thread.remaining_follow_ups(), 1);
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_budget_terminates_without_model_call() {
        let gateway = ScriptedGateway::new(vec![ScriptedReply::Text("Should not be asked")]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("Q?", None, 0);

        let completed = expect_complete(
            controller
                .submit_answer(&thread, "some answer")
                .await
                .expect("open thread"),
        );

        assert_eq!(completed.reason, TerminalReason::MaxReached);
        assert_eq!(completed.thread.user_turns(), 1);
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn budget_is_monotonic_and_model_is_not_called_after_zero() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedReply::Text("First follow-up?"),
            ScriptedReply::Text("Second follow-up?"),
            ScriptedReply::Text("Third follow-up?"),
        ]);
        let controller = controller(&gateway);
        let mut thread = ConversationThread::new("Q?", None, 2);
        let mut budgets = vec![thread.remaining_follow_ups()];

        let completed = loop {
            match controller
                .submit_answer(&thread, "ok")
                .await
                .expect("open thread")
            {
                TurnOutcome::FollowUp { thread: next, .. } => {
                    budgets.push(next.remaining_follow_ups());
                    thread = next;
                }
                TurnOutcome::Complete(completed) => break completed,
                TurnOutcome::Cancelled => panic!("nothing cancels this turn"),
            }
        };

        assert_eq!(budgets, vec![2, 1, 0]);
        assert!(budgets.windows(2).all(|pair| pair[1] <= pair[0]));
        assert_eq!(completed.reason, TerminalReason::MaxReached);
        assert_eq!(gateway.calls(), 2);
        assert_eq!(completed.thread.user_turns(), 3);
        assert_eq!(completed.thread.assistant_turns(), 2);
    }

    #[tokio::test]
    async fn sentinel_wrapped_in_prose_stores_no_follow_up_text() {
        let gateway = ScriptedGateway::new(vec![ScriptedReply::Text(
            "Thanks! conversation_complete",
        )]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("Q?", None, 2);

        let completed = expect_complete(
            controller
                .submit_answer(&thread, "A long and careful answer about the whole talk.")
                .await
                .expect("open thread"),
        );

        assert_eq!(completed.reason, TerminalReason::Comprehensive);
        assert!(
            completed
                .thread
                .history()
                .iter()
                .all(|message| message.role == MessageRole::User)
        );
        assert_eq!(completed.thread.remaining_follow_ups(), 2);
    }

    #[tokio::test]
    async fn model_failure_reaches_error_terminal_state() {
        let gateway = ScriptedGateway::new(vec![ScriptedReply::Fail]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("Q?", None, 2);

        let completed = expect_complete(
            controller
                .submit_answer(&thread, "meh")
                .await
                .expect("open thread"),
        );

        assert_eq!(completed.reason, TerminalReason::Error);
        assert_eq!(completed.thread.user_turns(), 1);
        assert_eq!(completed.thread.terminal_reason(), Some(TerminalReason::Error));
    }

    #[tokio::test]
    async fn empty_or_mangled_reply_reaches_error_terminal_state() {
        for reply in ["   ", "Conversation complete."] {
            let gateway = ScriptedGateway::new(vec![ScriptedReply::Text(reply)]);
            let controller = controller(&gateway);
            let thread = ConversationThread::new("Q?", None, 2);

            let completed = expect_complete(
                controller
                    .submit_answer(&thread, "meh")
                    .await
                    .expect("open thread"),
            );
            assert_eq!(completed.reason, TerminalReason::Error);
            assert_eq!(completed.thread.assistant_turns(), 0);
        }
    }

    #[tokio::test]
    async fn cancelled_turn_leaves_thread_untouched() {
        let gateway = ScriptedGateway::new(vec![ScriptedReply::Hang]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("Q?", None, 2);
        let before = thread.clone();

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let turn = controller.submit_answer_until(&thread, "fine", None, async move {
            let _ = cancel_rx.await;
        });
        cancel_tx.send(()).expect("cancel signal should send");

        assert_eq!(turn.await, Ok(TurnOutcome::Cancelled));
        assert_eq!(thread, before);
    }

    #[tokio::test]
    async fn terminal_threads_reject_further_answers() {
        let gateway = ScriptedGateway::new(vec![]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("Q?", None, 0);
        let completed = expect_complete(
            controller
                .submit_answer(&thread, "done")
                .await
                .expect("open thread"),
        );

        assert_eq!(
            controller.submit_answer(&completed.thread, "more").await,
            Err(ConversationError::AlreadyTerminal(TerminalReason::MaxReached))
        );
        assert_eq!(
            controller.submit_answer(&thread, "  ").await,
            Err(ConversationError::EmptyAnswer)
        );
    }

    #[tokio::test]
    async fn follow_up_mentioning_completion_words_keeps_thread_open() {
        let gateway = ScriptedGateway::new(vec![ScriptedReply::Text(
            "Does the conversation complete the picture, or was something missing?",
        )]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("Q?", None, 2);

        let (question, next) = expect_follow_up(
            controller
                .submit_answer(&thread, "mostly")
                .await
                .expect("open thread"),
        );

        assert!(question.starts_with("Does the conversation complete"));
        assert_eq!(next.terminal_reason(), None);
        assert_eq!(next.remaining_follow_ups(), 1);
    }

    #[tokio::test]
    async fn session_id_is_forwarded_as_requester() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedReply::Text("Why?"),
            ScriptedReply::Text("CONVERSATION_COMPLETE"),
        ]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("Q?", None, 2);

        let (_, next) = expect_follow_up(
            controller
                .submit_answer_as(&thread, "fine", "workshop-7")
                .await
                .expect("open thread"),
        );
        controller
            .submit_answer(&next, "because")
            .await
            .expect("open thread");

        let requesters = gateway.requesters.lock().expect("requester log lock").clone();
        assert_eq!(requesters, vec![Some("workshop-7".to_string()), None]);
    }

    #[test]
    fn reviewer_close_skips_the_model() {
        let gateway = ScriptedGateway::new(vec![]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new("Q?", None, 2);

        let completed = controller
            .close_by_reviewer(&thread, "that's all")
            .expect("open thread");

        assert_eq!(completed.reason, TerminalReason::UserDone);
        assert_eq!(completed.thread.user_turns(), 1);
        assert_eq!(gateway.calls(), 0);
    }

    #[test]
    fn finalized_feedback_carries_history_and_hash() {
        let gateway = ScriptedGateway::new(vec![]);
        let controller = controller(&gateway);
        let thread = ConversationThread::new(" What did you think? ", None, 2);
        let completed = controller
            .close_by_reviewer(&thread, "Loved it")
            .expect("open thread");
        let target = FeedbackTarget {
            presentation_id: "deck-1".to_string(),
            slide_id: "slide-9".to_string(),
            form_id: Some("closing-form".to_string()),
        };

        let feedback = finalize_feedback(&completed, &target, "workshop-1");

        assert_eq!(feedback.question_hash, hash_question("what did you think?"));
        assert_eq!(feedback.feedback_type, FeedbackType::Text);
        assert_eq!(feedback.response_text, "Loved it");
        assert_eq!(feedback.session_id, "workshop-1");
        assert_eq!(feedback.terminal_reason, Some(TerminalReason::UserDone));
        assert_eq!(feedback.conversation.as_ref().map(Vec::len), Some(1));
        assert_eq!(feedback.validate(), Ok(()));
    }
}
