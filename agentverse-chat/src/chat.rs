//! Login flow and message exchange for one browser session.

use std::sync::Arc;

use agentverse_core::{AgentverseError, ChatMessage, TextAgent, UserProfile};
use serde::Deserialize;
use uuid::Uuid;

use crate::oauth::IdentityProvider;
use crate::session::{PendingLogin, SessionStore};

/// Query string the provider sends back to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// True when the query string came from the provider's redirect.
    pub fn is_callback(&self) -> bool {
        self.code.is_some() || self.state.is_some() || self.error.is_some()
    }
}

#[derive(Clone)]
pub struct ChatService {
    sessions: SessionStore,
    agent: TextAgent,
    identity: Option<Arc<dyn IdentityProvider>>,
}

fn session_gone() -> AgentverseError {
    AgentverseError::Auth("Session expired. Please sign in again.".to_string())
}

impl ChatService {
    pub fn new(
        sessions: SessionStore,
        agent: TextAgent,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            sessions,
            agent,
            identity,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn login_available(&self) -> bool {
        self.identity.is_some()
    }

    fn identity(&self) -> Result<&Arc<dyn IdentityProvider>, AgentverseError> {
        self.identity.as_ref().ok_or_else(|| {
            AgentverseError::Config(
                "OAuth client is not configured. Provide client_secrets.json or GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET.".to_string(),
            )
        })
    }

    /// Issue a fresh state/nonce pair and return the consent URL.
    pub async fn start_login(&self, sid: Uuid) -> Result<String, AgentverseError> {
        let identity = self.identity()?;
        let pending = PendingLogin::generate();
        let url = identity.authorization_url(&pending.state, &pending.nonce);

        self.sessions
            .update(sid, |s| s.pending_login = Some(pending))
            .await
            .ok_or_else(session_gone)?;
        Ok(url)
    }

    pub async fn complete_login(
        &self,
        sid: Uuid,
        params: CallbackParams,
    ) -> Result<UserProfile, AgentverseError> {
        // A callback consumes the pending login whatever its outcome.
        let pending = self
            .sessions
            .update(sid, |s| s.pending_login.take())
            .await
            .ok_or_else(session_gone)?;

        if let Some(error) = params.error {
            return Err(AgentverseError::Auth(format!(
                "Sign-in was not completed: {}",
                error
            )));
        }

        let pending = pending.ok_or_else(|| {
            AgentverseError::Auth("No sign-in in progress. Please try again.".to_string())
        })?;
        if params.state.as_deref() != Some(pending.state.as_str()) {
            tracing::warn!(session = %sid, "OAuth state mismatch");
            return Err(AgentverseError::Auth(
                "OAuth state mismatch. Please try signing in again.".to_string(),
            ));
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AgentverseError::Auth("Missing authorization code".to_string()))?;

        let profile = self.identity()?.exchange_code(&code, &pending.nonce).await?;

        self.sessions
            .update(sid, |s| s.user = Some(profile.clone()))
            .await
            .ok_or_else(session_gone)?;
        tracing::info!(session = %sid, email = ?profile.email, "User signed in");
        Ok(profile)
    }

    /// Append the user message, call the agent, append its reply.
    ///
    /// On failure the user message stays in the transcript without a reply.
    pub async fn send_message(&self, sid: Uuid, text: &str) -> Result<String, AgentverseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentverseError::Validation(
                "Message must not be empty".to_string(),
            ));
        }

        let authenticated = self
            .sessions
            .update(sid, |s| {
                if s.is_authenticated() {
                    s.transcript.push(ChatMessage::user(text));
                    true
                } else {
                    false
                }
            })
            .await
            .ok_or_else(session_gone)?;
        if !authenticated {
            return Err(AgentverseError::Auth("Please sign in to chat.".to_string()));
        }

        // The lock is not held across the upstream call.
        let reply = match self.agent.respond(text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(session = %sid, error = %e, "Agent call failed");
                return Err(e);
            }
        };

        self.sessions
            .update(sid, |s| {
                if s.is_authenticated() {
                    s.transcript.push(ChatMessage::agent(reply.clone()));
                }
            })
            .await;
        Ok(reply)
    }

    pub async fn logout(&self, sid: Uuid) {
        self.sessions.remove(sid).await;
        tracing::info!(session = %sid, "Signed out");
    }

    pub async fn flash(&self, sid: Uuid, error: &AgentverseError) {
        let msg = error.to_string();
        self.sessions.update(sid, |s| s.flash = Some(msg)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentverse_core::{ErrorKind, GenerationError, OutputRecord, TextGenerator};
    use async_trait::async_trait;

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, prompt: &str, _t: Option<f32>) -> Result<String, GenerationError> {
            if prompt == "fail" {
                return Err(GenerationError::Api {
                    code: 503,
                    message: "overloaded".to_string(),
                });
            }
            Ok(format!("echo: {}", prompt))
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    struct FakeIdentity;

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        fn authorization_url(&self, state: &str, nonce: &str) -> String {
            format!("https://idp.test/auth?state={}&nonce={}", state, nonce)
        }

        async fn exchange_code(&self, code: &str, _nonce: &str) -> Result<UserProfile, AgentverseError> {
            if code == "good" {
                Ok(UserProfile {
                    name: Some("Dana".to_string()),
                    email: Some("dana@example.com".to_string()),
                })
            } else {
                Err(AgentverseError::Auth("invalid_grant".to_string()))
            }
        }
    }

    fn service(dir: &tempfile::TempDir) -> ChatService {
        let agent = TextAgent::new(
            Arc::new(EchoGenerator),
            OutputRecord::new(dir.path().join("out.json")),
        );
        ChatService::new(
            SessionStore::from_minutes(60),
            agent,
            Some(Arc::new(FakeIdentity)),
        )
    }

    async fn signed_in(svc: &ChatService) -> Uuid {
        let sid = svc.sessions().resolve(None).await;
        svc.start_login(sid).await.unwrap();
        let state = svc
            .sessions()
            .snapshot(sid)
            .await
            .unwrap()
            .pending_login
            .unwrap()
            .state;
        svc.complete_login(
            sid,
            CallbackParams {
                code: Some("good".to_string()),
                state: Some(state),
                error: None,
            },
        )
        .await
        .unwrap();
        sid
    }

    #[tokio::test]
    async fn test_login_flow_sets_user() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let sid = signed_in(&svc).await;

        let session = svc.sessions().snapshot(sid).await.unwrap();
        assert_eq!(session.user.unwrap().email.as_deref(), Some("dana@example.com"));
        assert!(session.pending_login.is_none());
    }

    #[tokio::test]
    async fn test_state_mismatch_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let sid = svc.sessions().resolve(None).await;
        svc.start_login(sid).await.unwrap();

        let err = svc
            .complete_login(
                sid,
                CallbackParams {
                    code: Some("good".to_string()),
                    state: Some("forged".to_string()),
                    error: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!svc.sessions().snapshot(sid).await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_provider_error_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let sid = svc.sessions().resolve(None).await;
        svc.start_login(sid).await.unwrap();

        let err = svc
            .complete_login(
                sid,
                CallbackParams {
                    error: Some("access_denied".to_string()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[tokio::test]
    async fn test_send_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let sid = svc.sessions().resolve(None).await;

        let err = svc.send_message(sid, "hello").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(svc.sessions().snapshot(sid).await.unwrap().transcript.is_empty());
    }

    #[tokio::test]
    async fn test_send_appends_both_messages() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let sid = signed_in(&svc).await;

        let reply = svc.send_message(sid, "  hi there ").await.unwrap();
        assert_eq!(reply, "echo: hi there");

        let transcript = svc.sessions().snapshot(sid).await.unwrap().transcript;
        assert_eq!(
            transcript,
            vec![ChatMessage::user("hi there"), ChatMessage::agent("echo: hi there")]
        );
    }

    #[tokio::test]
    async fn test_failed_send_keeps_only_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let sid = signed_in(&svc).await;

        let err = svc.send_message(sid, "fail").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(
            svc.sessions().snapshot(sid).await.unwrap().transcript,
            vec![ChatMessage::user("fail")]
        );
    }

    #[tokio::test]
    async fn test_empty_message_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let sid = signed_in(&svc).await;

        let err = svc.send_message(sid, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_login_without_provider_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = TextAgent::new(
            Arc::new(EchoGenerator),
            OutputRecord::new(dir.path().join("out.json")),
        );
        let svc = ChatService::new(SessionStore::from_minutes(60), agent, None);
        let sid = svc.sessions().resolve(None).await;

        let err = svc.start_login(sid).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_logout_drops_session() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let sid = signed_in(&svc).await;

        svc.logout(sid).await;
        assert!(svc.sessions().snapshot(sid).await.is_none());
    }
}
