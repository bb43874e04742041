use crate::config::Config;
use crate::models::{ChatMessage, ChatResponse};
use anyhow::{Context, Result};
use async_openai::{Client, config::OpenAIConfig, types::CreateChatCompletionRequestArgs};
use std::collections::HashMap;

/// System prompt template for grounded product chat; `{context}` is
/// replaced with the rendered context block before the call
const GROUNDED_PROMPT: &str = "You are an AI assistant helping users find products. \
Answer the user's question grounded in the context below. \
If the context does not cover the question, say so instead of guessing.\n\n\
# Context\n{context}";

/// Adapter for the hosted chat-completion endpoint
pub struct ChatClient {
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl ChatClient {
    pub fn new(config: &Config) -> Self {
        Self {
            api_base: config.connection_string.clone(),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Run a grounded chat call and wrap the reply
    ///
    /// The reply text is JSON-quoted before being placed in
    /// `ChatResponse::message`.
    pub async fn chat_with_products(
        &self,
        messages: &[ChatMessage],
        context: Option<&HashMap<String, String>>,
    ) -> Result<ChatResponse> {
        let client = self.create_client();
        let request = self.build_request(messages, context)?;
        let response = client
            .chat()
            .create(request)
            .await
            .context("Chat completion request failed")?;

        let content = Self::extract_content(response);
        let message =
            serde_json::to_string(&content).context("Failed to quote chat response content")?;

        Ok(ChatResponse { message })
    }

    /// Create the OpenAI-compatible client for the project endpoint
    fn create_client(&self) -> Client<OpenAIConfig> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&self.api_key)
            .with_api_base(&self.api_base);

        Client::with_config(openai_config)
    }

    /// Build the chat completion request: grounded system message first,
    /// then the caller's conversation turns
    fn build_request(
        &self,
        messages: &[ChatMessage],
        context: Option<&HashMap<String, String>>,
    ) -> Result<async_openai::types::CreateChatCompletionRequest> {
        let system_message = async_openai::types::ChatCompletionRequestSystemMessageArgs::default()
            .content(Self::render_system_prompt(context))
            .build()
            .context("Failed to build system message")?
            .into();

        let mut request_messages = vec![system_message];
        for message in messages {
            request_messages.push(Self::build_turn(message)?);
        }

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(request_messages)
            .temperature(self.temperature as f32)
            .max_tokens(self.max_tokens as u16)
            .build()
            .context("Failed to build chat completion request")
    }

    /// Convert one conversation turn into a request message
    fn build_turn(
        message: &ChatMessage,
    ) -> Result<async_openai::types::ChatCompletionRequestMessage> {
        let turn = match message.role.as_str() {
            "assistant" => async_openai::types::ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()
                .context("Failed to build assistant message")?
                .into(),
            _ => async_openai::types::ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()
                .context("Failed to build user message")?
                .into(),
        };

        Ok(turn)
    }

    /// Substitute the rendered context block into the grounded template
    fn render_system_prompt(context: Option<&HashMap<String, String>>) -> String {
        let rendered = match context {
            Some(context) if !context.is_empty() => {
                let mut entries: Vec<String> = context
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .collect();
                entries.sort();
                entries.join("\n")
            }
            _ => "(none)".to_string(),
        };

        GROUNDED_PROMPT.replace("{context}", &rendered)
    }

    /// Extract the reply text from the first choice
    fn extract_content(
        response: async_openai::types::CreateChatCompletionResponse,
    ) -> String {
        match response.choices.first() {
            Some(choice) => match &choice.message.content {
                Some(content) => content.clone(),
                None => String::new(),
            },
            None => String::new(),
        }
    }
}
