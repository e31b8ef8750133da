//! Assembles the data behind every preview surface: html pages, the embed
//! payload and raw cards.

use bytes::Bytes;
use serde::Serialize;

use crate::card::CardRenderer;
use crate::classify::{ProfileRef, Target};
use crate::embed::{discord_embed, EmbedResponse};
use crate::misskey::{FetchError, InstanceMeta, MisskeyClient, Note, User};
use crate::sanitize::{sanitize, summary};

/// Notes shown on profile and instance pages.
pub const NOTES_LIMIT: u32 = 20;

const DESCRIPTION_MAX_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct SiteSettings {
    /// Public origin of this service, without a trailing slash.
    pub base_url: String,
    pub site_name: String,
}

/// OpenGraph metadata for a page head.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OgData {
    pub title: String,
    pub description: String,
    pub url: String,
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub site_name: String,
}

/// Where a note's preview image may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Preview url of the first attachment.
    Attachment,
    /// A card rendered by [`CardRenderer`].
    RenderedCard,
}

/// Image strategies for `note`, best first.
pub fn image_plan(note: &Note) -> &'static [ImageSource] {
    if note.files.len() == 1 {
        &[ImageSource::Attachment]
    } else {
        &[ImageSource::RenderedCard, ImageSource::Attachment]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotePage {
    pub domain: String,
    pub note: Note,
    pub og: OgData,
    /// Sanitized note body.
    pub body_html: String,
    /// Sanitized body of the quoted note, if any.
    pub quote_html: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfilePage {
    pub domain: String,
    pub user: User,
    pub og: OgData,
    pub bio_html: String,
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstancePage {
    pub domain: String,
    pub meta: InstanceMeta,
    pub og: OgData,
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Preview {
    Note(NotePage),
    Profile(ProfilePage),
    Instance(InstancePage),
}

#[derive(Clone)]
pub struct PreviewService {
    client: MisskeyClient,
    renderer: CardRenderer,
    site: SiteSettings,
}

impl PreviewService {
    pub fn new(client: MisskeyClient, renderer: CardRenderer, site: SiteSettings) -> Self {
        Self {
            client,
            renderer,
            site,
        }
    }

    pub fn site(&self) -> &SiteSettings {
        &self.site
    }

    fn card_url(&self, domain: &str, note_id: &str) -> String {
        format!("{}/og-image/{domain}/notes/{note_id}", self.site.base_url)
    }

    async fn note_image(&self, note: &Note, domain: &str) -> Option<String> {
        for source in image_plan(note) {
            let found = match source {
                ImageSource::Attachment => {
                    note.files.first().map(|file| file.preview_url().to_string())
                }
                ImageSource::RenderedCard => self
                    .renderer
                    .render(note, domain)
                    .await
                    .map(|_| self.card_url(domain, &note.id)),
            };

            if found.is_some() {
                return found;
            }
            log::debug!("{domain}: no {source:?} image for note {}", note.id);
        }

        None
    }

    pub async fn note(&self, domain: &str, note_id: &str) -> Result<NotePage, FetchError> {
        let note = self.client.fetch_note(domain, note_id).await?;

        let og = OgData {
            title: format!("{} on {domain}", note.user.display_name()),
            description: summary(note.text.as_deref(), DESCRIPTION_MAX_LEN),
            url: format!("https://{domain}/notes/{note_id}"),
            image: self.note_image(&note, domain).await,
            kind: "article",
            site_name: self.site.site_name.clone(),
        };

        let body_html = sanitize(note.text.as_deref().unwrap_or_default());
        let quote_html = note
            .quoted()
            .map(|quoted| sanitize(quoted.text.as_deref().unwrap_or_default()));

        Ok(NotePage {
            domain: domain.to_string(),
            note,
            og,
            body_html,
            quote_html,
        })
    }

    pub async fn profile(&self, domain: &str, user: &ProfileRef) -> Result<ProfilePage, FetchError> {
        let user = match user {
            ProfileRef::Username(username) => self.client.fetch_user(domain, username).await?,
            ProfileRef::Id(id) => self.client.fetch_user_by_id(domain, id).await?,
        };

        // recent notes are decoration, the profile renders without them
        let notes = self
            .client
            .fetch_user_notes(domain, &user.summary.id, NOTES_LIMIT)
            .await
            .unwrap_or_else(|err| {
                log::warn!("{domain}: notes for {} unavailable: {err}", user.summary.username);
                Vec::new()
            });

        let og = OgData {
            title: format!("{} (@{}) on {domain}", user.summary.display_name(), user.summary.username),
            description: summary(user.description.as_deref(), DESCRIPTION_MAX_LEN),
            url: format!("https://{domain}/@{}", user.summary.username),
            image: user.summary.avatar_url.clone(),
            kind: "profile",
            site_name: self.site.site_name.clone(),
        };

        Ok(ProfilePage {
            domain: domain.to_string(),
            bio_html: sanitize(user.description.as_deref().unwrap_or_default()),
            user,
            og,
            notes,
        })
    }

    pub async fn instance(&self, domain: &str) -> Result<InstancePage, FetchError> {
        let (meta, notes) = tokio::try_join!(
            self.client.fetch_instance_meta(domain),
            self.client.fetch_timeline(domain, NOTES_LIMIT),
        )?;

        let og = OgData {
            title: meta.name.clone().unwrap_or_else(|| domain.to_string()),
            description: summary(meta.description.as_deref(), DESCRIPTION_MAX_LEN),
            url: format!("https://{domain}"),
            image: meta.banner_url.clone().or_else(|| meta.icon_url.clone()),
            kind: "website",
            site_name: self.site.site_name.clone(),
        };

        Ok(InstancePage {
            domain: domain.to_string(),
            meta,
            og,
            notes,
        })
    }

    pub async fn embed(&self, domain: &str, note_id: &str) -> Result<EmbedResponse, FetchError> {
        let note = self.client.fetch_note(domain, note_id).await?;
        Ok(discord_embed(&note))
    }

    /// `Ok(None)` when the note exists but no card could be rendered.
    pub async fn card(&self, domain: &str, note_id: &str) -> Result<Option<Bytes>, FetchError> {
        let note = self.client.fetch_note(domain, note_id).await?;
        Ok(self.renderer.render(&note, domain).await)
    }

    pub async fn inspect(&self, target: &Target) -> Result<Preview, FetchError> {
        Ok(match target {
            Target::Note { domain, id } => Preview::Note(self.note(domain, id).await?),
            Target::Profile { domain, user } => Preview::Profile(self.profile(domain, user).await?),
            Target::Instance { domain } => Preview::Instance(self.instance(domain).await?),
        })
    }

    pub fn shutdown(&self) {
        self.renderer.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note_with_files(count: usize) -> Note {
        let files: Vec<_> = (0..count)
            .map(|i| json!({"url": format!("https://x/{i}.png"), "type": "image/png"}))
            .collect();
        serde_json::from_value(json!({
            "id": "n1",
            "createdAt": "2024-05-01T12:00:00Z",
            "user": {"id": "u1", "username": "alice"},
            "files": files
        }))
        .unwrap()
    }

    #[test]
    fn test_single_attachment_uses_it_directly() {
        assert_eq!(image_plan(&note_with_files(1)), &[ImageSource::Attachment]);
    }

    #[test]
    fn test_other_notes_try_card_first() {
        for count in [0, 2, 5] {
            assert_eq!(
                image_plan(&note_with_files(count)),
                &[ImageSource::RenderedCard, ImageSource::Attachment]
            );
        }
    }

    #[test]
    fn test_og_type_serializes_as_type() {
        let og = OgData {
            title: "t".into(),
            description: "d".into(),
            url: "u".into(),
            image: None,
            kind: "article",
            site_name: "vxsharkey".into(),
        };
        let value = serde_json::to_value(og).unwrap();
        assert_eq!(value["type"], "article");
        assert!(value["image"].is_null());
    }
}
