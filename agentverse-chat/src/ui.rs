//! Server-rendered chat page.

use std::fmt::Write;

use agentverse_core::Role;

use crate::session::ChatSession;

const TITLE: &str = "Agentverse: Chat with Text Agent";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; }
.msg { padding: .6rem .9rem; border-radius: .5rem; margin: .4rem 0; white-space: pre-wrap; }
.user { background: #eef3ff; }
.agent { background: #f4f4f4; }
.flash { background: #ffecec; color: #8a1f1f; padding: .6rem .9rem; border-radius: .5rem; }
.caption { color: #666; font-size: .85rem; }
form.send { display: flex; gap: .5rem; margin-top: 1rem; }
form.send input[type=text] { flex: 1; padding: .5rem; }
"#;

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the page for a session. `flash` is the one-shot error, already taken.
pub fn render_page(session: &ChatSession, flash: Option<&str>, login_available: bool) -> String {
    let mut body = String::new();

    if let Some(msg) = flash {
        let _ = write!(body, r#"<p class="flash">{}</p>"#, escape_html(msg));
    }

    match &session.user {
        None => render_signed_out(&mut body, login_available),
        Some(user) => {
            let who = user
                .name
                .as_deref()
                .or(user.email.as_deref())
                .unwrap_or("there");
            let _ = write!(
                body,
                r#"<p>Welcome, {}! <form method="post" action="/logout" style="display:inline"><button type="submit">Sign out</button></form></p>"#,
                escape_html(who)
            );

            for message in &session.transcript {
                let (class, speaker) = match message.role {
                    Role::User => ("user", "You"),
                    Role::Agent => ("agent", "Agent"),
                };
                let _ = write!(
                    body,
                    r#"<div class="msg {}"><strong>{}:</strong> {}</div>"#,
                    class,
                    speaker,
                    escape_html(&message.text)
                );
            }

            body.push_str(
                r#"<form class="send" method="post" action="/send"><input type="text" name="text" placeholder="Type your message..." autofocus required><button type="submit">Send</button></form>"#,
            );
            if let Some(email) = &user.email {
                let _ = write!(
                    body,
                    r#"<p class="caption">Requests are associated with {}.</p>"#,
                    escape_html(email)
                );
            }
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{title}</title><style>{style}</style></head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>"#,
        title = TITLE,
        style = STYLE,
        body = body
    )
}

fn render_signed_out(body: &mut String, login_available: bool) {
    body.push_str("<p>Sign in with your Google account to chat with the agent.</p>");
    if login_available {
        body.push_str(r#"<p><a href="/login">Sign in with Google</a></p>"#);
    } else {
        body.push_str(
            r#"<p class="flash">OAuth client is not configured. Provide client_secrets.json or GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET and restart.</p>"#,
        );
    }
}
