use crate::queue::default_classifier;
use crate::types::Capture;
use crate::{ReplSession, Result};

pub async fn raw(session: &ReplSession, command: &str) -> Result<Capture> {
    session.execute(command, default_classifier).await
}
