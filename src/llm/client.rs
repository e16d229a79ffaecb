use super::backend::{BackendError, CompletionBackend, CompletionRequest};
use super::message::{HistoryTurn, MessagePart};
use super::models::{ModelMap, ModelProfile};
use crate::util::sanitize_error_text;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Shown when the backend succeeds but produces no text
pub const EMPTY_RESPONSE_FALLBACK: &str = "No textual response produced.";

/// Rate limit retry configuration
pub const MAX_RETRIES: u32 = 5;
pub const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
pub const BACKOFF_MULTIPLIER: u64 = 2; // Exponential backoff
/// Added on top of any wait the backend asks for
const RETRY_SAFETY_BUFFER: Duration = Duration::from_secs(1);
/// Longest wait a backend hint can impose on a single retry
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(120);

/// Outcome of a completion call.
///
/// Both variants carry text meant for the transcript. Failures are values,
/// never errors, so the caller can always display something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    Failed(String),
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Completion::Text(text) | Completion::Failed(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Completion::Text(text) | Completion::Failed(text) => text,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Completion::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the `retry_count`-th retry (1-based):
    /// 2s, 4s, 8s, 16s, 32s with the defaults.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.saturating_pow(retry_count.saturating_sub(1));
        let ms = (self.initial_backoff.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(ms)
    }

    /// How long to wait before the `retry_count`-th retry after `err`.
    ///
    /// An explicit retry-after hint wins, then a "retry in N s" phrase in the
    /// message, then exponential backoff. Hints are capped at
    /// [`MAX_RETRY_HINT`] and get a one second buffer.
    pub fn delay_for(&self, retry_count: u32, err: &BackendError) -> Duration {
        match err.retry_after.or_else(|| parse_retry_in(&err.message)) {
            Some(hint) => hint.min(MAX_RETRY_HINT).saturating_add(RETRY_SAFETY_BUFFER),
            None => self.backoff(retry_count),
        }
    }
}

/// Whether a failure is a transient quota/rate-limit condition worth retrying
pub fn is_quota_error(err: &BackendError) -> bool {
    if matches!(err.status, Some(429) | Some(503)) {
        return true;
    }
    if err
        .status_text
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("RESOURCE_EXHAUSTED"))
    {
        return true;
    }
    let lower = err.message.to_lowercase();
    ["resource_exhausted", "quota", "rate limit", "rate-limit", "too many requests"]
        .iter()
        .any(|signal| lower.contains(signal))
}

/// Extract "retry in 12s" / "retry in 3.5 seconds" from an error message.
/// A number too large for a [`Duration`] counts as no hint.
fn parse_retry_in(message: &str) -> Option<Duration> {
    static RETRY_IN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RETRY_IN
        .get_or_init(|| Regex::new(r"(?i)retry in\s+(\d+(?:\.\d+)?)\s*s").ok())
        .as_ref()?;
    let secs: f64 = re.captures(message)?.get(1)?.as_str().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn quota_exhausted_message(profile: ModelProfile, attempts: u32) -> String {
    let hint = match profile {
        ModelProfile::Deep => "Switch to the fast profile (`--profile fast`), which has much higher limits, or wait a minute and try again.",
        ModelProfile::Fast => "Wait a minute and try again; the fast profile is already the most generous tier.",
    };
    format!(
        "The model service is out of quota: it kept rate limiting this request ({} attempts). {}",
        attempts, hint
    )
}

fn request_failed_message(err: &BackendError) -> String {
    match err.status {
        Some(401) | Some(403) => format!(
            "The model service rejected the API key ({}). Run `repair-relay setup` to update it.",
            sanitize_error_text(&err.message)
        ),
        Some(status) => format!(
            "Error from the model service ({}): {}",
            status,
            sanitize_error_text(&err.message)
        ),
        None => format!("Error: {}", sanitize_error_text(&err.message)),
    }
}

/// Wraps a [`CompletionBackend`] with profile mapping, retry and backoff.
pub struct CompletionClient<B> {
    backend: B,
    models: ModelMap,
    retry: RetryPolicy,
}

impl<B: CompletionBackend> CompletionClient<B> {
    pub fn new(backend: B, models: ModelMap) -> Self {
        Self {
            backend,
            models,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one completion, retrying quota failures with backoff.
    ///
    /// Never returns an error: every failure path ends in a
    /// [`Completion::Failed`] message suitable for the transcript. At most
    /// `1 + max_retries` requests are sent, all with identical parameters.
    pub async fn complete(
        &self,
        system_prompt: &str,
        history: &[HistoryTurn],
        parts: Vec<MessagePart>,
        profile: ModelProfile,
        thinking_budget: u32,
    ) -> Completion {
        let request = CompletionRequest {
            model: self.models.id(profile).to_string(),
            system_instruction: system_prompt.to_string(),
            history: history.to_vec(),
            parts,
            thinking_budget: (thinking_budget > 0).then_some(thinking_budget),
        };

        let mut retry_count = 0;
        loop {
            tracing::debug!(
                model = %request.model,
                attempt = retry_count + 1,
                thinking_budget,
                "sending completion request"
            );

            let err = match self.backend.generate(&request).await {
                Ok(text) if text.is_empty() => {
                    return Completion::Text(EMPTY_RESPONSE_FALLBACK.to_string())
                }
                Ok(text) => return Completion::Text(text),
                Err(err) => err,
            };

            if !is_quota_error(&err) {
                tracing::warn!(status = ?err.status, "completion failed: {}", err);
                return Completion::Failed(request_failed_message(&err));
            }

            if retry_count >= self.retry.max_retries {
                tracing::warn!(
                    attempts = retry_count + 1,
                    "rate limited, giving up after {} retries",
                    retry_count
                );
                return Completion::Failed(quota_exhausted_message(profile, retry_count + 1));
            }

            retry_count += 1;
            let delay = self.retry.delay_for(retry_count, &err);
            tracing::warn!(
                "Rate limited by model service. Retrying in {:.1}s (attempt {}/{})",
                delay.as_secs_f64(),
                retry_count,
                self.retry.max_retries
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;

    fn quota() -> BackendError {
        BackendError::new("Resource has been exhausted").with_status(429)
    }

    fn client(backend: ScriptedBackend) -> CompletionClient<ScriptedBackend> {
        CompletionClient::new(backend, ModelMap::default())
    }

    async fn ask(client: &CompletionClient<ScriptedBackend>, profile: ModelProfile) -> Completion {
        client
            .complete("sys", &[], vec![MessagePart::text("hi")], profile, 0)
            .await
    }

    #[test]
    fn test_backoff_doubles_from_two_seconds() {
        let policy = RetryPolicy::default();
        let delays: Vec<u128> = (1..=5).map(|n| policy.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 32000]);
    }

    #[test]
    fn test_delay_prefers_explicit_hint() {
        let policy = RetryPolicy::default();
        let err = quota().with_retry_after(Duration::from_secs(10));
        assert_eq!(policy.delay_for(3, &err), Duration::from_secs(11));
    }

    #[test]
    fn test_delay_parses_retry_in_message() {
        let policy = RetryPolicy::default();
        let err = BackendError::new("Quota exceeded. Please retry in 7.5s.").with_status(429);
        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(8500));
    }

    #[test]
    fn test_structured_hint_beats_message_phrase() {
        let policy = RetryPolicy::default();
        let err = BackendError::new("Quota exceeded. Please retry in 30s.")
            .with_status(429)
            .with_retry_after(Duration::from_secs(10));
        assert_eq!(policy.delay_for(1, &err), Duration::from_secs(11));
    }

    #[test]
    fn test_oversized_hints_are_capped_or_ignored() {
        let policy = RetryPolicy::default();
        let huge = quota().with_retry_after(Duration::MAX);
        assert_eq!(
            policy.delay_for(1, &huge),
            MAX_RETRY_HINT + Duration::from_secs(1)
        );

        let unparseable =
            BackendError::new("Quota exceeded. Please retry in 99999999999999999999999s.")
                .with_status(429);
        assert_eq!(policy.delay_for(2, &unparseable), policy.backoff(2));
    }

    #[test]
    fn test_quota_classification() {
        assert!(is_quota_error(&BackendError::new("x").with_status(429)));
        assert!(is_quota_error(&BackendError::new("x").with_status(503)));
        assert!(is_quota_error(
            &BackendError::new("x").with_status_text("RESOURCE_EXHAUSTED")
        ));
        assert!(is_quota_error(&BackendError::new(
            "You exceeded your current quota"
        )));
        assert!(!is_quota_error(&BackendError::new("bad request").with_status(400)));
        assert!(!is_quota_error(&BackendError::new("internal").with_status(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_text_verbatim() {
        let backend = ScriptedBackend::new(vec![Ok("  answer\n".into())]);
        let client = client(backend);
        assert_eq!(
            ask(&client, ModelProfile::Fast).await,
            Completion::Text("  answer\n".into())
        );
        assert_eq!(client.backend().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_uses_fallback() {
        let client = client(ScriptedBackend::new(vec![Ok(String::new())]));
        assert_eq!(
            ask(&client, ModelProfile::Fast).await,
            Completion::Text(EMPTY_RESPONSE_FALLBACK.into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_failures_stop_after_six_attempts() {
        let client = client(ScriptedBackend::always(Err(quota())));
        let result = ask(&client, ModelProfile::Deep).await;

        assert!(result.is_failed());
        assert!(result.text().contains("out of quota"));
        assert!(result.text().contains("fast profile"));
        assert_eq!(client.backend().call_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let client = client(ScriptedBackend::always(Err(quota())));
        ask(&client, ModelProfile::Deep).await;

        let gaps: Vec<u128> = client
            .backend()
            .call_gaps()
            .iter()
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(gaps, vec![2000, 4000, 8000, 16000, 32000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_quota() {
        let backend = ScriptedBackend::new(vec![
            Err(quota()),
            Err(quota().with_retry_after(Duration::from_secs(10))),
            Ok("finally".into()),
        ]);
        let client = client(backend);

        assert_eq!(
            ask(&client, ModelProfile::Fast).await,
            Completion::Text("finally".into())
        );
        let gaps: Vec<u128> = client
            .backend()
            .call_gaps()
            .iter()
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(gaps, vec![2000, 11000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_retry_phrase_falls_back_to_backoff() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::new("Quota exceeded. Please retry in 99999999999999999999999s.")
                .with_status(429)),
            Ok("ok".into()),
        ]);
        let client = client(backend);

        assert_eq!(
            ask(&client, ModelProfile::Fast).await,
            Completion::Text("ok".into())
        );
        let gaps: Vec<u128> = client
            .backend()
            .call_gaps()
            .iter()
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(gaps, vec![2000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_send_identical_requests() {
        let backend = ScriptedBackend::new(vec![Err(quota()), Ok("ok".into())]);
        let client = client(backend);
        client
            .complete(
                "sys",
                &[HistoryTurn::user("before")],
                vec![MessagePart::text("hi")],
                ModelProfile::Deep,
                2048,
            )
            .await;

        let requests = client.backend().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[0].model, ModelMap::default().deep);
        assert_eq!(requests[0].thinking_budget, Some(2048));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_quota_failure_is_immediate() {
        let err = BackendError::new("API key not valid").with_status(400);
        let client = client(ScriptedBackend::always(Err(err)));
        let result = ask(&client, ModelProfile::Deep).await;

        assert!(result.is_failed());
        assert!(result.text().contains("API key not valid"));
        assert_eq!(client.backend().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_disables_reasoning() {
        let client = client(ScriptedBackend::new(vec![Ok("x".into())]));
        ask(&client, ModelProfile::Fast).await;
        assert_eq!(client.backend().requests()[0].thinking_budget, None);
        assert_eq!(client.backend().requests()[0].model, ModelMap::default().fast);
    }
}
