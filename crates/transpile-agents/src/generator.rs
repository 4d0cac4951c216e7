//! First-draft generation and compiler-guided repair.

use tracing::{debug, warn};
use transpile_core::feedback::{extract_candidate, MalformedOutput};

use crate::errors::PipelineError;
use crate::model::RetryingModel;
use crate::prompts::{generate_request, refine_request, GenerateInputs, RefineInputs};

/// A model reply and the program extracted from it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub raw: String,
    pub code: Result<String, MalformedOutput>,
}

impl Candidate {
    fn from_reply(raw: String) -> Self {
        let code = extract_candidate(&raw);
        if let Err(reason) = &code {
            warn!(%reason, chars = raw.len(), "Model reply held no usable code");
        }
        Self { raw, code }
    }

    /// Extracted code, or the raw reply when nothing usable was found.
    pub fn text(&self) -> &str {
        match &self.code {
            Ok(code) => code,
            Err(_) => &self.raw,
        }
    }
}

pub struct Generator {
    model: RetryingModel,
}

impl Generator {
    pub fn new(model: RetryingModel) -> Self {
        Self { model }
    }

    pub async fn generate(&self, inputs: &GenerateInputs<'_>) -> Result<Candidate, PipelineError> {
        let reply = self.model.call(&generate_request(inputs)).await?;
        debug!(chars = reply.len(), "Draft received");
        Ok(Candidate::from_reply(reply))
    }

    /// Ask for a repaired program given the previous attempt's diagnostics.
    pub async fn refine(&self, inputs: &RefineInputs<'_>) -> Result<Candidate, PipelineError> {
        let reply = self.model.call(&refine_request(inputs)).await?;
        debug!(chars = reply.len(), "Repair received");
        Ok(Candidate::from_reply(reply))
    }
}
