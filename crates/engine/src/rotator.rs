use std::sync::Mutex;

use courier_common::error::AppError;

/// Round-robin cursor over a fixed prompt list, shared by manual requests and
/// the daily broadcast.
#[derive(Debug)]
pub struct PromptRotator {
    prompts: Vec<String>,
    cursor: Mutex<usize>,
}

impl PromptRotator {
    pub fn new(prompts: Vec<String>) -> Result<Self, AppError> {
        if prompts.is_empty() {
            return Err(AppError::Config(
                "prompt rotation needs at least one prompt".to_string(),
            ));
        }
        Ok(Self {
            prompts,
            cursor: Mutex::new(0),
        })
    }

    /// Return the prompt under the cursor and advance it, wrapping around.
    pub fn next(&self) -> String {
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let prompt = self.prompts[*cursor].clone();
        *cursor = (*cursor + 1) % self.prompts.len();
        prompt
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
