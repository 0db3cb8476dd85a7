// In-process transport that replays scripted responses

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::client::QrzTransport;
use super::credentials::Credential;
use crate::error::QrzError;

pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<String, QrzError>>>,
    calls: Mutex<Vec<Vec<(String, String)>>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<String, QrzError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Parameters of every request made so far, in order
    pub fn calls(&self) -> Vec<Vec<(String, String)>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QrzTransport for ScriptedTransport {
    async fn fetch(
        &self,
        _credential: &Credential,
        params: &[(String, String)],
    ) -> Result<String, QrzError> {
        self.calls.lock().unwrap().push(params.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(QrzError::Api("no scripted response left".to_string())))
    }
}
