//! One-shot prompt enhancement over an ephemeral backend session.
//!
//! A temporary session is created, the prompt is sent with an optimization
//! instruction, the streamed answer is collected until turn completion, and
//! the session is cancelled again — success, failure, or timeout.

use std::sync::Arc;
use std::time::Duration;

use backend_bridge::{BackendClient, BackendError, BackendEvent};
use tokio::sync::broadcast::error::RecvError;

use crate::error::ClientError;

pub(crate) async fn enhance_prompt(
    backend: &Arc<dyn BackendClient>,
    cwd: &str,
    system_prompt: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<Option<String>, ClientError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Ok(None);
    }

    let session = backend.create_session(cwd).await?;
    let session_id = session.session_id;
    tracing::debug!(%session_id, "created ephemeral enhancement session");

    let events = backend.subscribe();
    let full_prompt = format!(
        "{system_prompt}\n\n---\n\nOriginal prompt:\n{prompt}\n\n---\n\nImproved prompt:"
    );

    let result = match backend.send_prompt(&session_id, &full_prompt).await {
        Ok(_) => tokio::time::timeout(timeout, collect_response(events, &session_id))
            .await
            .unwrap_or(Err(ClientError::EnhanceTimeout)),
        Err(error) => Err(ClientError::Backend(error)),
    };

    // The ephemeral session must not outlive the request.
    if let Err(error) = backend.cancel(&session_id).await {
        tracing::debug!(%session_id, %error, "failed to cancel enhancement session");
    }

    result
}

async fn collect_response(
    mut events: tokio::sync::broadcast::Receiver<BackendEvent>,
    session_id: &str,
) -> Result<Option<String>, ClientError> {
    let mut chunks = String::new();

    loop {
        match events.recv().await {
            Ok(BackendEvent::MessageChunk {
                session_id: event_session,
                text,
            }) if event_session == session_id => {
                chunks.push_str(&text);
            }
            Ok(BackendEvent::TurnComplete {
                session_id: event_session,
                ..
            }) if event_session == session_id => {
                let trimmed = chunks.trim();
                return Ok((!trimmed.is_empty()).then(|| trimmed.to_string()));
            }
            Ok(BackendEvent::Error {
                session_id: event_session,
                message,
            }) if event_session.is_none() || event_session.as_deref() == Some(session_id) => {
                return Err(ClientError::Backend(BackendError::rejected(message)));
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "enhancement subscriber lagged");
            }
            Err(RecvError::Closed) => {
                return Err(ClientError::Backend(BackendError::Closed));
            }
        }
    }
}
