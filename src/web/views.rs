//! Server-rendered pages.
//!
//! Note bodies arrive here already sanitized and are emitted raw, everything
//! else goes through maud's escaping.

use axum::http::StatusCode;
use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::card::template::FOOTER;
use crate::misskey::{Attachment, Note, UserSummary};
use crate::preview::{InstancePage, NotePage, OgData, ProfilePage};
use crate::sanitize::sanitize;

pub const PAGE_CSS: &str = r#"
*{margin:0;padding:0;box-sizing:border-box}
body{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,sans-serif;line-height:1.6;color:#e8e8f0;background:#16213e;min-height:100vh;display:flex;flex-direction:column;align-items:center;padding:1.5rem 1rem}
main{max-width:680px;width:100%;flex:1}
a{color:#4a9eff;text-decoration:none}
a:hover{text-decoration:underline}
img{max-width:100%;height:auto}
h1{font-size:1.6rem;margin-bottom:.5rem}
.card{padding:1.25rem;border-radius:10px;background:#1a1a2e;margin-bottom:1rem}
.author{display:flex;align-items:center;gap:.75rem;margin-bottom:.75rem}
.avatar{width:48px;height:48px;border-radius:50%;object-fit:cover}
.author-name{font-weight:600}
.author-handle,.meta{color:#999;font-size:.85rem}
.content{word-break:break-word}
.cw{color:#ffb84a;margin-bottom:.5rem}
.files{display:grid;grid-template-columns:1fr 1fr;gap:6px;margin:.75rem 0}
.files img{width:100%;border-radius:8px;object-fit:cover}
.quote{border-left:4px solid #4a9eff;padding:.5rem .85rem;margin:.75rem 0;background:rgba(255,255,255,.05);border-radius:6px}
.banner{width:100%;max-height:200px;object-fit:cover;border-radius:10px;margin-bottom:1rem}
.stats{display:flex;gap:1.25rem;color:#999;font-size:.9rem;margin:.5rem 0}
form{display:flex;gap:.5rem;margin:1rem 0}
input[type=url]{flex:1;padding:.6rem;border-radius:6px;border:1px solid #333;background:#0f0f17;color:#eee}
button{padding:.6rem 1rem;border-radius:6px;border:none;background:#4a9eff;color:#fff;cursor:pointer}
footer{margin-top:2rem;color:#888;font-size:.85rem}
.error-page{text-align:center;margin-top:20vh}
"#;

fn layout(title: &str, og: Option<&OgData>, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                @if let Some(og) = og {
                    meta name="description" content=(og.description);
                    link rel="canonical" href=(og.url);
                    meta property="og:title" content=(og.title);
                    meta property="og:description" content=(og.description);
                    meta property="og:url" content=(og.url);
                    meta property="og:type" content=(og.kind);
                    meta property="og:site_name" content=(og.site_name);
                    @if let Some(image) = &og.image {
                        meta property="og:image" content=(image);
                        meta name="twitter:card" content="summary_large_image";
                        meta name="twitter:image" content=(image);
                    } @else {
                        meta name="twitter:card" content="summary";
                    }
                    meta name="twitter:title" content=(og.title);
                    meta name="twitter:description" content=(og.description);
                    meta name="theme-color" content="#4a9eff";
                }
                style { (PreEscaped(PAGE_CSS)) }
            }
            body {
                main { (body) }
                footer { (FOOTER) }
            }
        }
    }
}

fn author(user: &UserSummary, domain: &str) -> Markup {
    html! {
        div.author {
            @if let Some(avatar) = &user.avatar_url {
                img.avatar src=(avatar) alt="" loading="lazy";
            }
            div {
                a.author-name href={"/profile/" (user.host.as_deref().unwrap_or(domain)) "/" (user.username)} { (user.display_name()) }
                div.author-handle { "@" (user.username) "@" (user.host.as_deref().unwrap_or(domain)) }
            }
        }
    }
}

fn files(files: &[Attachment]) -> Markup {
    html! {
        @if files.iter().any(Attachment::is_image) {
            div.files {
                @for file in files.iter().filter(|f| f.is_image()) {
                    a href=(file.url) target="_blank" rel="noopener noreferrer" {
                        img src=(file.preview_url()) alt=(file.name.as_deref().unwrap_or_default()) loading="lazy";
                    }
                }
            }
        }
    }
}

/// Compact note used in profile and instance listings.
fn note_item(note: &Note, domain: &str) -> Markup {
    html! {
        article.card {
            (author(&note.user, domain))
            @if let Some(cw) = &note.cw {
                div.cw { "CW: " (cw) }
            }
            div.content { (PreEscaped(sanitize(note.text.as_deref().unwrap_or_default()))) }
            (files(&note.files))
            div.meta {
                a href={"/instance/" (domain) "/notes/" (note.id)} {
                    (note.created_at.format("%Y-%m-%d %H:%M UTC").to_string())
                }
            }
        }
    }
}

pub fn home(site_name: &str) -> Markup {
    layout(
        site_name,
        None,
        html! {
            h1 { "🦈 " (site_name) }
            p { "Better link previews for Misskey and Sharkey notes, profiles and instances." }
            form action="/resolve" method="get" {
                input type="url" name="url" placeholder="https://example.social/notes/..." required;
                button type="submit" { "Preview" }
            }
            p.meta { "Or prefix any url with " code { "/raw/" } "." }
        },
    )
}

pub fn note(page: &NotePage, site_name: &str) -> Markup {
    let note = &page.note;
    let title = format!("{} - {site_name}", note.user.display_name());

    layout(
        &title,
        Some(&page.og),
        html! {
            article.card {
                (author(&note.user, &page.domain))
                @if let Some(cw) = &note.cw {
                    div.cw { "CW: " (cw) }
                }
                div.content { (PreEscaped(&page.body_html)) }
                (files(&note.files))
                @if let (Some(quoted), Some(quote_html)) = (note.quoted(), &page.quote_html) {
                    div.quote {
                        (author(&quoted.user, &page.domain))
                        div.content { (PreEscaped(quote_html)) }
                    }
                }
                div.meta {
                    (note.created_at.format("%Y-%m-%d %H:%M UTC").to_string())
                    " · "
                    a href=(page.og.url) { "View on " (page.domain) }
                }
            }
        },
    )
}

pub fn profile(page: &ProfilePage, site_name: &str) -> Markup {
    let user = &page.user;
    let title = format!("{} - {site_name}", user.summary.display_name());

    layout(
        &title,
        Some(&page.og),
        html! {
            @if let Some(banner) = &user.banner_url {
                img.banner src=(banner) alt="";
            }
            section.card {
                (author(&user.summary, &page.domain))
                div.content { (PreEscaped(&page.bio_html)) }
                div.stats {
                    @if let Some(count) = user.notes_count { span { (count) " notes" } }
                    @if let Some(count) = user.following_count { span { (count) " following" } }
                    @if let Some(count) = user.followers_count { span { (count) " followers" } }
                }
                a href=(page.og.url) { "View on " (page.domain) }
            }
            @for note in &page.notes {
                (note_item(note, &page.domain))
            }
        },
    )
}

pub fn instance(page: &InstancePage, site_name: &str) -> Markup {
    let meta = &page.meta;
    let title = format!("{} - {site_name}", page.og.title);

    layout(
        &title,
        Some(&page.og),
        html! {
            @if let Some(banner) = &meta.banner_url {
                img.banner src=(banner) alt="";
            }
            section.card {
                h1 { (page.og.title) }
                @if let Some(description) = &meta.description {
                    div.content { (PreEscaped(sanitize(description))) }
                }
                div.stats {
                    @if let Some(version) = &meta.version { span { "v" (version) } }
                    @if let Some(maintainer) = &meta.maintainer_name { span { "Maintained by " (maintainer) } }
                }
                a href=(page.og.url) { "Visit " (page.domain) }
            }
            @for note in &page.notes {
                (note_item(note, &page.domain))
            }
        },
    )
}

pub fn error(status: StatusCode, message: &str) -> Markup {
    let title = status.canonical_reason().unwrap_or("Error");

    layout(
        &format!("{title} - vxsharkey"),
        None,
        html! {
            div.error-page {
                h1 { (status.as_u16()) " " (title) }
                p { (message) }
                a href="/" { "Back to vxsharkey" }
            }
        },
    )
}
