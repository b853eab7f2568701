//! SockJS wire protocol: frame tags, framing helpers, and page templates.

use md5::{Digest, Md5};

// ---------------------------------------------------------------------------
// Frame tags
// ---------------------------------------------------------------------------

pub const FRAME_OPEN: &str = "o";
pub const FRAME_CLOSE: &str = "c";
pub const FRAME_MESSAGE: &str = "a";
pub const FRAME_MESSAGE_BLOB: &str = "a1";
pub const FRAME_HEARTBEAT: &str = "h";

/// One outbound frame as stored in a session's queue.
///
/// `Message` holds the coalesced payload list; `MessageBlob` holds an
/// already serialized `a[...]` frame that must reach the wire verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Open,
    Message(Vec<String>),
    MessageBlob(String),
    Heartbeat,
    Close(u16, String),
}

impl Frame {
    /// The wire-visible tag for this frame kind.
    pub fn tag(&self) -> &'static str {
        match self {
            Frame::Open => FRAME_OPEN,
            Frame::Message(_) => FRAME_MESSAGE,
            Frame::MessageBlob(_) => FRAME_MESSAGE_BLOB,
            Frame::Heartbeat => FRAME_HEARTBEAT,
            Frame::Close(..) => FRAME_CLOSE,
        }
    }

    /// Render the frame the way the framed transports put it on the wire.
    pub fn pack(&self) -> String {
        match self {
            Frame::Open => FRAME_OPEN.to_string(),
            Frame::Heartbeat => FRAME_HEARTBEAT.to_string(),
            Frame::Message(messages) => messages_frame(messages),
            Frame::MessageBlob(blob) => blob.clone(),
            Frame::Close(code, reason) => close_frame(*code, reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Framing helpers
// ---------------------------------------------------------------------------

/// `"c" + JSON([code, reason])`, compact.
pub fn close_frame(code: u16, reason: &str) -> String {
    format!("{}{}", FRAME_CLOSE, serde_json::json!([code, reason]))
}

/// `"a" + JSON([message])`, compact.
pub fn message_frame(message: &str) -> String {
    format!("{}{}", FRAME_MESSAGE, serde_json::json!([message]))
}

/// `"a" + JSON(messages)`, compact.
pub fn messages_frame(messages: &[String]) -> String {
    format!(
        "{}{}",
        FRAME_MESSAGE,
        serde_json::to_string(messages).expect("string list always serializes")
    )
}

// ---------------------------------------------------------------------------
// Handler messages
// ---------------------------------------------------------------------------

/// Events delivered to the application [`SessionHandler`](crate::SessionHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockjsMessage {
    /// The session transitioned NEW -> OPEN.
    Open,
    /// A message arrived from the client.
    Message(String),
    /// The session is closing; carries the error that interrupted it, if any.
    Close(Option<String>),
    /// The session reached its terminal state.
    Closed,
}

// ---------------------------------------------------------------------------
// Page templates
// ---------------------------------------------------------------------------

const IFRAME_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta http-equiv="X-UA-Compatible" content="IE=edge" />
<meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />
  <script src="{sockjs_cdn}"></script>
  <script>
    document.domain = document.domain;
    SockJS.bootstrap_iframe();
  </script>
</head>
<body>
  <h2>Don't panic!</h2>
  <p>This is a SockJS hidden iframe. It's used for cross domain magic.</p>
</body>
</html>"#;

const HTMLFILE_HTML: &str = r#"<!doctype html>
<html><head>
  <meta http-equiv="X-UA-Compatible" content="IE=edge" />
  <meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />
</head><body><h2>Don't panic!</h2>
  <script>
    document.domain = document.domain;
    var c = parent.{callback};
    c.start();
    function p(d) {c.message(d);};
    window.onload = function() {c.stop();};
  </script>
"#;

/// The iframe page with the SockJS client CDN URL filled in.
pub fn iframe_html(sockjs_cdn: &str) -> String {
    IFRAME_HTML.replace("{sockjs_cdn}", sockjs_cdn)
}

/// Hex MD5 of the rendered iframe page, served as its strong `ETag`.
pub fn iframe_etag(html: &str) -> String {
    let digest = Md5::digest(html.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The htmlfile streaming prelude with the client callback filled in.
pub fn htmlfile_page(callback: &str) -> String {
    HTMLFILE_HTML.replace("{callback}", callback)
}
