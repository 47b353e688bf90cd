//! Transcript management for ongoing chats with the API.
//!
//! A caller creates a conversation, then calls [`Conversation::user_message`] to obtain a request
//! it is expected to send to the API. Once the streamed reply has been received in full, the caller
//! hands it to [`Conversation::push_reply`].
//!
//! ## State management
//!
//! The completion API does not persist any state remotely, so every request carries the whole
//! transcript. The transcript always starts with a single system message and only ever grows.
//!
//! ## Example
//!
//! ```no_run
//! use chatline::{Api, conversation::Conversation};
//!
//! let api = Api::new("sk-...");
//! let mut conversation = Conversation::new("You are a helpful assistant.");
//!
//! let http_request = conversation.user_message(&api, "Hello!\n");
//!
//! // ... send http_request and collect the streamed reply ...
//! # let reply = String::from("Hi there!");
//!
//! conversation.push_reply(reply);
//! assert_eq!(conversation.history().len(), 3);
//! ```

use tracing::debug;

use crate::{
    Api, CompletionRequestBuilder,
    http_request::HttpRequest,
    openai::{self, Message, Role},
};

/// A conversation that manages message history and generates HTTP requests.
#[derive(Clone, Debug)]
pub struct Conversation {
    /// The conversation's message history, system message first.
    messages: im::Vector<Message>,
}

impl Conversation {
    /// Creates a new conversation, seeded with the given system prompt.
    pub fn new<S: Into<String>>(system: S) -> Self {
        Self {
            messages: im::vector![Message::new(Role::System, system)],
        }
    }

    /// Adds a user message and returns an HTTP request to send.
    ///
    /// The message will automatically be added to the conversation history, the request carries
    /// the full history.
    pub fn user_message<S: Into<String>>(&mut self, api: &Api, user_message: S) -> HttpRequest {
        self.messages
            .push_back(Message::new(Role::User, user_message));

        debug!(messages = self.messages.len(), "building completion request");
        CompletionRequestBuilder::new()
            .set_messages(self.messages.clone())
            .build(api)
    }

    /// Appends the complete assistant reply to the history.
    pub fn push_reply<S: Into<String>>(&mut self, reply: S) {
        self.messages
            .push_back(Message::new(Role::Assistant, reply));
    }

    /// Returns the message history.
    pub fn history(&self) -> &im::Vector<Message> {
        &self.messages
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(openai::DEFAULT_SYSTEM_PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Api,
        conversation::Conversation,
        openai::{Message, Role},
    };

    #[test]
    fn test_new_conversation_holds_system_message() {
        let conversation = Conversation::new("be brief");

        assert_eq!(conversation.history().len(), 1);
        assert_eq!(
            conversation.history()[0],
            Message::new(Role::System, "be brief")
        );

        let conversation = Conversation::default();
        assert_eq!(conversation.history()[0].role, Role::System);
    }

    #[test]
    fn test_user_message_request_carries_full_history() {
        let api = Api::new("test-token");
        let mut conversation = Conversation::new("be brief");

        conversation.user_message(&api, "first\n");
        conversation.push_reply("one");
        let http_request = conversation.user_message(&api, "second\n");

        let body: serde_json::Value = serde_json::from_str(&http_request.body).unwrap();
        assert_eq!(
            body["messages"],
            serde_json::json!([
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "first\n"},
                {"role": "assistant", "content": "one"},
                {"role": "user", "content": "second\n"},
            ])
        );
        assert_eq!(conversation.history().len(), 4);
    }
}
