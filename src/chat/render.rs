//! Server rendered chat page using Handlebars. Handlebars escapes HTML
//! by default which matters here since both user input and LLM output
//! are untrusted.

use anyhow::{Error, Result};
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;
use serde_json::json;

use super::session::ChatSession;

// Pick the avatar shown next to a chat bubble from the message role
handlebars_helper!(avatar: |role: str| match role {
    "assistant" => "/static/assistant_icon.svg",
    _ => "/static/user_icon.svg",
});

// The form works without javascript by posting to the page and being
// redirected back. With javascript the reply is streamed in from the
// chat API instead.
const CHAT_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Chat {{session_id}}</title>
</head>
<body>
<main>
{{#each messages}}
<div class="chat-message {{role}}">
<img class="avatar" src="{{avatar role}}" alt="{{role}}">
<p>{{content}}</p>
</div>
{{/each}}
<div id="pending" class="chat-message user" hidden>
<img class="avatar" src="/static/user_icon.svg" alt="user">
<p id="pending-content"></p>
</div>
<div id="reply" class="chat-message assistant" hidden>
<img class="avatar" src="/static/assistant_icon.svg" alt="assistant">
<p id="reply-content"></p>
</div>
{{#if error}}
<p class="error">{{error}}</p>
{{/if}}
<form id="chat-form" method="post" action="/chat/{{session_id}}" data-session="{{session_id}}">
<input type="text" name="message" value="{{draft}}" placeholder="Share an idea" autocomplete="off" required>
<button type="submit">Send</button>
</form>
{{#if saved_id}}
<p class="saved">Saved as {{saved_id}}</p>
{{#if display}}
<pre>{{display}}</pre>
{{/if}}
{{/if}}
{{#if save_available}}
<hr>
<form method="post" action="/chat/{{session_id}}/save">
<button type="submit">Save Data</button>
<p>Don't press this right away! Only when you're happy with your idea!</p>
</form>
{{/if}}
</main>
<script>
const form = document.getElementById("chat-form");
form.addEventListener("submit", async (event) => {
  event.preventDefault();
  const input = form.elements["message"];
  const message = input.value;
  if (!message.trim()) return;

  document.getElementById("pending-content").textContent = message;
  document.getElementById("pending").hidden = false;
  const reply = document.getElementById("reply-content");
  document.getElementById("reply").hidden = false;
  input.disabled = true;

  const response = await fetch("/api/chat", {
    method: "POST",
    headers: { "content-type": "application/json" },
    body: JSON.stringify({ session_id: form.dataset.session, message: message }),
  });
  const reader = response.body.pipeThrough(new TextDecoderStream()).getReader();
  let buffer = "";
  let failed = false;
  for (;;) {
    const { value, done } = await reader.read();
    if (done) break;
    buffer += value;
    let end;
    while ((end = buffer.indexOf("\n\n")) >= 0) {
      const frame = buffer.slice(0, end);
      buffer = buffer.slice(end + 2);
      if (!frame.startsWith("data:")) continue;
      const data = JSON.parse(frame.slice(5));
      if (data.type === "partial") reply.textContent = data.content;
      if (data.type === "error") {
        reply.textContent = data.message;
        failed = true;
      }
    }
  }

  if (failed) {
    input.disabled = false;
  } else {
    window.location.reload();
  }
});
</script>
</body>
</html>
"#;

/// Extra state shown on the page besides the transcript.
#[derive(Debug, Default, Serialize)]
pub struct PageStatus {
    /// Why the last turn failed
    pub error: Option<String>,
    /// Input to put back in the message box so it can be retried
    pub draft: Option<String>,
    pub saved_id: Option<String>,
    /// The printed snapshot when saving to the display
    pub display: Option<String>,
}

/// Build the template registry. Done once when the app starts.
pub fn templates() -> Result<Handlebars<'static>, Error> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_helper("avatar", Box::new(avatar));
    registry.register_template_string("chat", CHAT_PAGE)?;
    Ok(registry)
}

/// Render the session as an HTML page. System messages are never
/// shown and the save form only appears once saving is available.
pub fn render_transcript(
    templates: &Handlebars,
    session: &ChatSession,
    status: &PageStatus,
) -> Result<String, Error> {
    let data = json!({
        "session_id": session.id,
        "messages": session.transcript().rendered(),
        "save_available": session.save_available(),
        "error": status.error,
        "draft": status.draft,
        "saved_id": status.saved_id,
        "display": status.display,
    });
    let html = templates.render("chat", &data)?;
    Ok(html)
}
