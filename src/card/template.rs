//! Markup for the 1200x630 preview card.

use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::misskey::Note;
use crate::sanitize::{strip, truncate};

const BODY_MAX_LEN: usize = 300;
const QUOTE_MAX_LEN: usize = 100;
const MAX_IMAGES: usize = 4;

pub const FOOTER: &str = "🦈 vxsharkey • by m5rcode";

const CARD_CSS: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
  width: 1200px;
  height: 630px;
  background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);
  color: #fff;
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
  display: flex;
  flex-direction: column;
  padding: 40px;
}
.header { display: flex; align-items: center; margin-bottom: 30px; }
.avatar { width: 80px; height: 80px; border-radius: 50%; margin-right: 20px; object-fit: cover; }
.username { font-size: 36px; font-weight: 700; }
.domain { font-size: 24px; color: #aaa; margin-top: 5px; }
.content { flex: 1; font-size: 28px; line-height: 1.5; overflow: hidden; margin-bottom: 20px; }
.files { display: grid; gap: 10px; margin-bottom: 20px; max-height: 250px; }
.files.grid-1 { grid-template-columns: 1fr; }
.files.grid-2 { grid-template-columns: 1fr 1fr; }
.files.grid-3 { grid-template-columns: 1fr 1fr 1fr; }
.files.grid-4 { grid-template-columns: 1fr 1fr; grid-template-rows: 1fr 1fr; }
.files img { width: 100%; height: 100%; object-fit: cover; border-radius: 8px; }
.quote {
  background: rgba(255, 255, 255, 0.1);
  border-left: 4px solid #4a9eff;
  padding: 15px;
  border-radius: 8px;
  margin-top: 15px;
}
.quote-header { display: flex; align-items: center; margin-bottom: 10px; }
.quote-avatar { width: 30px; height: 30px; border-radius: 50%; margin-right: 10px; }
.quote-username { font-size: 20px; font-weight: 600; }
.quote-text { font-size: 20px; color: #ddd; }
.footer {
  display: flex;
  justify-content: space-between;
  align-items: center;
  font-size: 24px;
  color: #888;
  margin-top: auto;
}
"#;

fn grid_class(count: usize) -> &'static str {
    match count {
        1 => "grid-1",
        2 => "grid-2",
        3 => "grid-3",
        _ => "grid-4",
    }
}

fn quote_block(quoted: &Note) -> Markup {
    let text = truncate(&strip(quoted.text.as_deref().unwrap_or_default()), QUOTE_MAX_LEN);

    html! {
        div.quote {
            div.quote-header {
                img.quote-avatar src=(quoted.user.avatar_url.as_deref().unwrap_or_default()) alt="";
                span.quote-username { (quoted.user.display_name()) }
            }
            div.quote-text { (text) }
        }
    }
}

/// Self-contained document for the card renderer. All note content is
/// escaped, only the stylesheet is emitted raw.
pub fn card_html(note: &Note, domain: &str) -> String {
    let text = truncate(&strip(note.text.as_deref().unwrap_or_default()), BODY_MAX_LEN);
    let images: Vec<_> = note.images().take(MAX_IMAGES).collect();

    let markup = html! {
        (DOCTYPE)
        html {
            head {
                meta charset="UTF-8";
                style { (PreEscaped(CARD_CSS)) }
            }
            body {
                div.header {
                    img.avatar
                        src=(note.user.avatar_url.as_deref().unwrap_or_default())
                        alt=""
                        onerror="this.style.display='none'";
                    div {
                        div.username { (note.user.display_name()) }
                        div.domain { "@" (domain) }
                    }
                }
                div.content { (text) }
                @if !images.is_empty() {
                    div class=(format!("files {}", grid_class(images.len()))) {
                        @for image in &images {
                            img src=(image.preview_url()) alt="";
                        }
                    }
                }
                @if let Some(quoted) = note.quoted() {
                    (quote_block(quoted))
                }
                div.footer {
                    span { (FOOTER) }
                }
            }
        }
    };

    markup.into_string()
}
