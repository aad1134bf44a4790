use super::provider::{LLMProvider, Message, ToolCall};
use super::tools::ToolRegistry;
use super::AgentError;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

pub struct AgentEngine {
    provider: Arc<dyn LLMProvider>,
    tool_registry: Arc<ToolRegistry>,
    max_context_tokens: usize,
    max_iterations: usize,
}

impl AgentEngine {
    pub fn new(provider: Arc<dyn LLMProvider>, tool_registry: Arc<ToolRegistry>) -> Self {
        Self::with_context_limit(provider, tool_registry, 100000)
    }

    pub fn with_context_limit(provider: Arc<dyn LLMProvider>, tool_registry: Arc<ToolRegistry>, max_tokens: usize) -> Self {
        Self {
            provider,
            tool_registry,
            max_context_tokens: max_tokens,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Run one agent turn: the model may call tools repeatedly until it
    /// answers in plain text.
    pub async fn process_message(
        &self,
        system_prompt: Option<String>,
        user_message: String,
        conversation_history: Vec<Message>,
    ) -> Result<String, AgentError> {
        let mut messages = Vec::with_capacity(conversation_history.len() + 2);
        if let Some(system) = system_prompt {
            messages.push(Message::system(system));
        }
        messages.extend(conversation_history);
        messages.push(Message::user(user_message));

        // Check if we need to summarize context
        if self.estimate_tokens(&messages) > self.max_context_tokens {
            messages = self.summarize_context(messages).await?;
        }

        let tools = if self.tool_registry.is_empty() {
            None
        } else {
            Some(self.tool_registry.get_definitions())
        };

        let mut iterations = 0;

        loop {
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(AgentError::MaxIterations(self.max_iterations));
            }

            // Call LLM
            let response = self.provider.generate(messages.clone(), tools.clone()).await?;

            // If no tool calls, return the response
            if response.tool_calls.is_empty() {
                return Ok(response.content);
            }

            // Execute tool calls
            let mut tool_results = Vec::new();
            for tool_call in &response.tool_calls {
                let result = self.execute_tool(tool_call).await;
                tool_results.push((tool_call.id.clone(), tool_call.name.clone(), result));
            }

            // Providers reject empty assistant turns
            let assistant_content = if response.content.trim().is_empty() {
                let calls = response
                    .tool_calls
                    .iter()
                    .map(|c| format!("{}({})", c.name, c.arguments))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Calling tools: {}", calls)
            } else {
                response.content.clone()
            };
            messages.push(Message::assistant(assistant_content));

            // Add tool results as user messages
            for (tool_id, tool_name, result) in tool_results {
                messages.push(Message::user(format!(
                    "Tool '{}' (id: {}) returned: {}",
                    tool_name,
                    tool_id,
                    serde_json::to_string_pretty(&result)?
                )));
            }
        }
    }

    /// Failures go back to the model as data so it can adjust its plan.
    async fn execute_tool(&self, tool_call: &ToolCall) -> Value {
        let tool = match self.tool_registry.get(&tool_call.name) {
            Some(tool) => tool,
            None => {
                log::warn!("Model requested unknown tool '{}'", tool_call.name);
                return serde_json::json!({ "error": format!("Tool '{}' not found", tool_call.name) });
            }
        };

        log::info!("Executing tool {} with {}", tool_call.name, tool_call.arguments);
        match tool.execute(tool_call.arguments.clone()).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Tool {} failed: {}", tool_call.name, e);
                serde_json::json!({ "error": e.to_string() })
            }
        }
    }

    /// Estimate token count (rough approximation: 1 token ~ 4 characters)
    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        total_chars / 4
    }

    /// Summarize conversation history when approaching token limit
    async fn summarize_context(
        &self,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, AgentError> {
        log::info!("Context window approaching limit, summarizing conversation...");

        let (system, rest): (Vec<Message>, Vec<Message>) =
            messages.into_iter().partition(|m| m.role == "system");

        // Keep the first message and the last few messages
        let keep_recent = 5;
        let messages_len = rest.len();

        if messages_len <= keep_recent + 1 {
            return Ok(system.into_iter().chain(rest).collect());
        }

        // Extract messages to summarize (middle portion)
        let to_summarize = &rest[1..messages_len.saturating_sub(keep_recent)];
        let recent = &rest[messages_len.saturating_sub(keep_recent)..];

        // Create summarization prompt
        let conversation_text = to_summarize
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let summary_prompt = format!(
            "Please provide a concise summary of the following research notes, \
             preserving names, addresses, distances, populations and other findings:\n\n{}",
            conversation_text
        );

        // Generate summary (without tools)
        let summary_response = self
            .provider
            .generate(vec![Message::user(summary_prompt)], None)
            .await?;

        // Construct new message history with summary
        let mut new_messages = system;
        new_messages.push(rest[0].clone());
        new_messages.push(Message::assistant(format!(
            "[Previous conversation summary]: {}",
            summary_response.content
        )));
        new_messages.extend_from_slice(recent);

        Ok(new_messages)
    }
}
