//! The interactive conversation loop.
//!
//! A [`Session`] owns the transcript and the input mode. [`run_turn`] processes one turn of input
//! against any [`Completions`] implementation, [`run`] drives the whole read-submit-stream-render
//! cycle over arbitrary reader and writer handles.

use std::io::{self, BufRead, Write};

use tracing::{debug, info, trace};

use crate::{
    Api, Error,
    conversation::Conversation,
    http_request::HttpRequest,
    input::{self, Input, InputMode},
};

/// Printed once at startup.
pub const BANNER: &str = r#"
  ____ _           _    ____ ____ _____
 / ___| |__   __ _| |_ / ___|  _ \_   _|
| |   | '_ \ / _` | __| |  _| |_) || |
| |___| | | | (_| | |_| |_| |  __/ | |
 \____|_| |_|\__,_|\__|\____|_|    |_|
"#;

/// Printed before the input mode is read.
pub const MODE_HELP: &str = "Please choose mode: 0 or 1.\n\
     0 is single-line text, 1 is multi-line text.\n\
     Note: default is 0. In mode 1, a question is submitted by a line containing only '//end'.";

/// Shown before each turn's input.
pub const PROMPT: &str = "You: ";

/// Shown before each streamed reply.
pub const REPLY_PREFIX: &str = "ChatGPT: ";

/// Printed when the session ends normally.
pub const FAREWELL: &str = "Have a nice day.";

/// A source of streamed completions.
pub trait Completions {
    /// The fragments of one reply. Dropping it releases the connection.
    type Stream: Iterator<Item = Result<String, Error>>;

    /// Sends a completion request, returning the reply stream once the response has started.
    fn stream(&self, request: HttpRequest) -> Result<Self::Stream, Error>;
}

/// A fatal session error.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Failed to read input: {0}")]
    Input(#[source] io::Error),
    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),
    #[error("CompletionStream error: {0}")]
    Request(#[source] Error),
    #[error("Stream error: {0}")]
    Stream(#[source] Error),
}

/// What became of a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Empty input, the API was not contacted.
    Skipped,
    /// A full reply was received and recorded.
    Replied,
    /// The user quit or input ended.
    Ended,
}

/// State of a chat session.
#[derive(Debug)]
pub struct Session {
    api: Api,
    conversation: Conversation,
    mode: InputMode,
}

impl Session {
    /// Creates a new session.
    pub fn new(api: Api, conversation: Conversation, mode: InputMode) -> Self {
        Self {
            api,
            conversation,
            mode,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }
}

/// Processes one turn of input.
///
/// Reply fragments are written to `out` as they arrive. The reply is recorded as a single
/// assistant message once the stream ended cleanly; a failing stream records nothing.
pub fn run_turn<C, W>(
    session: &mut Session,
    client: &C,
    input: Input,
    out: &mut W,
) -> Result<Outcome, TurnError>
where
    C: Completions,
    W: Write,
{
    let text = match input {
        Input::Empty => {
            trace!("skipping empty input");
            return Ok(Outcome::Skipped);
        }
        Input::Eof => {
            writeln!(out).map_err(TurnError::Output)?;
            writeln!(out, "{}", FAREWELL).map_err(TurnError::Output)?;
            return Ok(Outcome::Ended);
        }
        Input::Quit => {
            writeln!(out, "{}", FAREWELL).map_err(TurnError::Output)?;
            return Ok(Outcome::Ended);
        }
        Input::Text(text) => text,
    };

    let request = session.conversation.user_message(&session.api, text);
    trace!("completion request:\n{}", request);

    let stream = client.stream(request).map_err(TurnError::Request)?;

    write!(out, "{}", REPLY_PREFIX).map_err(TurnError::Output)?;
    out.flush().map_err(TurnError::Output)?;

    let mut reply = String::new();
    for fragment in stream {
        let fragment = fragment.map_err(TurnError::Stream)?;
        out.write_all(fragment.as_bytes())
            .map_err(TurnError::Output)?;
        out.flush().map_err(TurnError::Output)?;
        reply.push_str(&fragment);
    }
    writeln!(out).map_err(TurnError::Output)?;

    debug!(len = reply.len(), "reply complete");
    session.conversation.push_reply(reply);

    Ok(Outcome::Replied)
}

/// Runs a whole session: banner, mode selection, then turns until the user quits.
///
/// Returns the finished session. Every error is fatal and ends the loop.
pub fn run<C, R, W>(
    api: Api,
    conversation: Conversation,
    client: &C,
    reader: &mut R,
    out: &mut W,
) -> Result<Session, TurnError>
where
    C: Completions,
    R: BufRead,
    W: Write,
{
    writeln!(out, "{}", BANNER).map_err(TurnError::Output)?;
    writeln!(out, "{}", MODE_HELP).map_err(TurnError::Output)?;
    out.flush().map_err(TurnError::Output)?;

    let mode = input::read_mode(reader).map_err(TurnError::Input)?;
    info!(?mode, "input mode selected");

    let mut session = Session::new(api, conversation, mode);
    loop {
        write!(out, "{}", PROMPT).map_err(TurnError::Output)?;
        out.flush().map_err(TurnError::Output)?;

        let input = input::read_input(reader, session.mode).map_err(TurnError::Input)?;
        if run_turn(&mut session, client, input, out)? == Outcome::Ended {
            return Ok(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        collections::VecDeque,
        io::{self, Cursor, Read},
    };

    use super::{
        Completions, FAREWELL, Outcome, PROMPT, REPLY_PREFIX, Session, TurnError, run, run_turn,
    };
    use crate::{
        Api, Error,
        conversation::Conversation,
        http_request::HttpRequest,
        input::{Input, InputMode},
        openai::{ApiError, Message, Role},
        stream::FragmentStream,
    };

    /// Serves canned event-stream bodies, one per request, and records requests.
    #[derive(Default)]
    struct Scripted {
        bodies: RefCell<VecDeque<Result<String, Error>>>,
        requests: RefCell<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new<I: IntoIterator<Item = Result<String, Error>>>(bodies: I) -> Self {
            Self {
                bodies: RefCell::new(bodies.into_iter().collect()),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl Completions for Scripted {
        type Stream = FragmentStream<Cursor<String>>;

        fn stream(&self, request: HttpRequest) -> Result<Self::Stream, Error> {
            self.requests.borrow_mut().push(request);
            let body = self
                .bodies
                .borrow_mut()
                .pop_front()
                .expect("unexpected completion request")?;
            Ok(FragmentStream::new(Cursor::new(body)))
        }
    }

    /// Builds an event-stream body replying with the given fragments.
    fn sse_reply(fragments: &[&str]) -> String {
        let mut body = String::from(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        );
        for fragment in fragments {
            let chunk = serde_json::json!({
                "choices": [{"index": 0, "delta": {"content": fragment}, "finish_reason": null}]
            });
            body.push_str(&format!("data: {}\n\n", chunk));
        }
        body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn new_session(mode: InputMode) -> Session {
        Session::new(
            Api::new("test-token"),
            Conversation::new("be brief"),
            mode,
        )
    }

    fn transcript(session: &Session) -> Vec<(Role, String)> {
        session
            .conversation()
            .history()
            .iter()
            .map(|Message { role, content }| (*role, content.clone()))
            .collect()
    }

    #[test]
    fn test_turn_streams_and_records_reply() {
        let client = Scripted::new([Ok(sse_reply(&["Hel", "lo", "!"]))]);
        let mut session = new_session(InputMode::SingleLine);
        let mut out = Vec::new();

        let outcome = run_turn(
            &mut session,
            &client,
            Input::Text("hi\n".to_owned()),
            &mut out,
        )
        .unwrap();

        assert_eq!(outcome, Outcome::Replied);
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}Hello!\n", REPLY_PREFIX));
        assert_eq!(
            transcript(&session),
            vec![
                (Role::System, "be brief".to_owned()),
                (Role::User, "hi\n".to_owned()),
                (Role::Assistant, "Hello!".to_owned()),
            ]
        );

        let body: serde_json::Value =
            serde_json::from_str(&client.requests.borrow()[0].body).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_empty_and_quit_never_contact_the_api() {
        let client = Scripted::default();

        for mode in [InputMode::SingleLine, InputMode::MultiLine] {
            let mut session = new_session(mode);
            let mut out = Vec::new();

            assert_eq!(
                run_turn(&mut session, &client, Input::Empty, &mut out).unwrap(),
                Outcome::Skipped
            );
            assert_eq!(
                run_turn(&mut session, &client, Input::Quit, &mut out).unwrap(),
                Outcome::Ended
            );
            assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", FAREWELL));
            assert_eq!(session.conversation().history().len(), 1);
        }

        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_request_failure_is_fatal() {
        let error = ApiError {
            message: "Incorrect API key provided.".to_owned(),
            kind: Some("invalid_request_error".to_owned()),
            code: Some("invalid_api_key".to_owned()),
        };
        let client = Scripted::new([Err(Error::Api(error))]);
        let mut session = new_session(InputMode::SingleLine);
        let mut out = Vec::new();

        let result = run_turn(
            &mut session,
            &client,
            Input::Text("hi\n".to_owned()),
            &mut out,
        );

        let Err(err @ TurnError::Request(_)) = result else {
            panic!("expected request error");
        };
        assert_eq!(
            err.to_string(),
            "CompletionStream error: API error: Incorrect API key provided."
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_stream_failure_keeps_only_what_was_received() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"tial\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n",
        );
        let client = Scripted::new([Ok(body.to_owned())]);
        let mut session = new_session(InputMode::SingleLine);
        let mut out = Vec::new();

        let result = run_turn(
            &mut session,
            &client,
            Input::Text("hi\n".to_owned()),
            &mut out,
        );

        assert!(matches!(result, Err(TurnError::Stream(Error::Api(_)))));
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}Partial", REPLY_PREFIX));
        assert_eq!(
            transcript(&session),
            vec![
                (Role::System, "be brief".to_owned()),
                (Role::User, "hi\n".to_owned()),
            ]
        );
    }

    #[test]
    fn test_non_event_body_is_a_stream_error() {
        let client = Scripted::new([
            Ok("<html>502 Bad Gateway</html>\n".to_owned()),
            Ok("{\"error\":{\"message\":\"quota exceeded\",\"type\":\"insufficient_quota\"}}\n".to_owned()),
        ]);

        let mut session = new_session(InputMode::SingleLine);
        let mut out = Vec::new();
        let result = run_turn(&mut session, &client, Input::Text("hi\n".to_owned()), &mut out);
        assert!(matches!(result, Err(TurnError::Stream(Error::InvalidStream(_)))));
        assert_eq!(session.conversation().history().len(), 2);

        let mut session = new_session(InputMode::SingleLine);
        let mut out = Vec::new();
        let result = run_turn(&mut session, &client, Input::Text("hi\n".to_owned()), &mut out);
        let Err(err @ TurnError::Stream(Error::Api(_))) = result else {
            panic!("expected API error");
        };
        assert_eq!(err.to_string(), "Stream error: API error: quota exceeded");
        assert_eq!(
            transcript(&session),
            vec![
                (Role::System, "be brief".to_owned()),
                (Role::User, "hi\n".to_owned()),
            ]
        );
    }

    #[test]
    fn test_full_session_in_multi_line_mode() {
        let client = Scripted::new([Ok(sse_reply(&["One", " reply"])), Ok(sse_reply(&["Two"]))]);
        let mut reader = Cursor::new("1\nline1\nline2\n//end\n\n//end\nagain\n//end\nquit\n//end\n");
        let mut out = Vec::new();

        let session = run(
            Api::new("test-token"),
            Conversation::new("be brief"),
            &client,
            &mut reader,
            &mut out,
        )
        .unwrap();

        assert_eq!(session.mode(), InputMode::MultiLine);
        assert_eq!(client.request_count(), 2);
        assert_eq!(
            transcript(&session),
            vec![
                (Role::System, "be brief".to_owned()),
                (Role::User, "line1\nline2\n".to_owned()),
                (Role::Assistant, "One reply".to_owned()),
                (Role::User, "again\n".to_owned()),
                (Role::Assistant, "Two".to_owned()),
            ]
        );

        // The second request carries the whole transcript so far.
        let body: serde_json::Value =
            serde_json::from_str(&client.requests.borrow()[1].body).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 4);

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(&format!("{}{}One reply\n", PROMPT, REPLY_PREFIX)));
        assert!(out.ends_with(&format!("{}{}\n", PROMPT, FAREWELL)));
    }

    #[test]
    fn test_full_session_ends_at_eof() {
        let client = Scripted::new([Ok(sse_reply(&["Hi"]))]);
        let mut reader = Cursor::new("0\nhello\n");
        let mut out = Vec::new();

        let session = run(
            Api::new("test-token"),
            Conversation::new("be brief"),
            &client,
            &mut reader,
            &mut out,
        )
        .unwrap();

        assert_eq!(session.mode(), InputMode::SingleLine);
        assert_eq!(session.conversation().history().len(), 3);
        assert!(
            String::from_utf8(out)
                .unwrap()
                .ends_with(&format!("{}\n{}\n", PROMPT, FAREWELL))
        );
    }

    #[test]
    fn test_input_failure_is_fatal() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("stdin closed"))
            }
        }

        let client = Scripted::default();
        let mut reader = io::BufReader::new(Broken);
        let mut out = Vec::new();

        let result = run(
            Api::new("test-token"),
            Conversation::new("be brief"),
            &client,
            &mut reader,
            &mut out,
        );

        assert!(matches!(result, Err(TurnError::Input(_))));
        assert_eq!(client.request_count(), 0);
    }
}
