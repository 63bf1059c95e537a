//! Scripted collaborators for pipeline tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::extraction::{PageRasterizer, RasterizeError};
use crate::inference::{InferenceClient, InferenceError, InferencePurpose, InferenceRequest};
use crate::models::RawDocument;

type Reply = Result<String, InferenceError>;

/// Answers each purpose from its own queue, in order, and records every
/// request. An exhausted queue answers with a transport error.
#[derive(Default)]
pub struct ScriptedInference {
    replies: Mutex<HashMap<InferencePurpose, VecDeque<Reply>>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, purpose: InferencePurpose, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn purposes(&self) -> Vec<InferencePurpose> {
        self.requests().iter().map(|r| r.purpose).collect()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn complete(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let purpose = request.purpose;
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .get_mut(&purpose)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(InferenceError::Transport(format!("no scripted reply for {}", purpose))))
    }
}

/// Produces one small fake PNG per page, up to the requested cap.
pub struct FakeRasterizer {
    page_count: usize,
    calls: Mutex<Vec<usize>>,
}

impl FakeRasterizer {
    pub fn pages(page_count: usize) -> Self {
        Self {
            page_count,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_pages_seen(&self) -> Option<usize> {
        self.calls.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn rasterize(
        &self,
        _document: Arc<RawDocument>,
        max_pages: usize,
    ) -> Result<Vec<Vec<u8>>, RasterizeError> {
        self.calls.lock().unwrap().push(max_pages);
        Ok((1..=self.page_count.min(max_pages))
            .map(|page| vec![0x89, b'P', b'N', b'G', page as u8])
            .collect())
    }
}
