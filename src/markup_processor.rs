use std::path::Path;

use futures::future::join_all;
use tracing::{debug, info};
use url::Url;

use crate::css_processor::{CssProcessor, DocumentLocation};
use crate::downloader::DownloadOutcome;
use crate::encoding::TextKind;
use crate::file_manager::FileManager;
use crate::html_parser::{rewrite, HtmlParser, ResourceKind, ResourceReference, RewritePlan};
use crate::session::MirrorSession;

/// Mirrors the assets of one page and rewrites the page to point at them.
pub struct MarkupProcessor<'a> {
    session: &'a MirrorSession,
}

impl<'a> MarkupProcessor<'a> {
    pub fn new(session: &'a MirrorSession) -> Self {
        Self { session }
    }

    /// Returns the rewritten markup once every download it triggered has
    /// finished, successfully or not. Failures only leave the file missing;
    /// the reference is rewritten regardless.
    pub async fn process(&self, html_content: &str, base_url: &Url) -> String {
        let resources = HtmlParser::from_url(base_url.clone()).discover(html_content);
        if resources.is_empty() {
            debug!("Page references no assets");
            return html_content.to_string();
        }

        info!(
            references = resources.references.len(),
            inline_styles = resources.inline_styles.len(),
            style_blocks = resources.style_blocks.len(),
            "Discovered page resources"
        );

        let css = CssProcessor::new(self.session);
        let mut plan = RewritePlan::default();
        let mut pending = Vec::new();

        for mut reference in resources.references {
            let claim = self.session.claim(reference.kind, &reference.resolved_url);
            reference.local_path = claim.path().to_path_buf();
            plan.link(
                reference.kind,
                reference.original_token.as_str(),
                FileManager::link_from(Path::new(""), &reference.local_path),
            );
            if claim.is_new() {
                pending.push(reference);
            }
        }

        let assets = join_all(pending.iter().map(|reference| self.materialize(reference, css)));
        let styles = join_all(
            resources
                .inline_styles
                .iter()
                .map(|style| css.process(style, base_url, DocumentLocation::Page)),
        );
        let blocks = join_all(
            resources
                .style_blocks
                .iter()
                .map(|block| css.process(block, base_url, DocumentLocation::Page)),
        );
        let (_, styles, blocks) = tokio::join!(assets, styles, blocks);

        for (original, rewritten) in resources.inline_styles.into_iter().zip(styles) {
            plan.style(original, rewritten);
        }
        for (original, rewritten) in resources.style_blocks.into_iter().zip(blocks) {
            plan.style_block(original, rewritten);
        }

        rewrite(html_content, &plan)
    }

    async fn materialize(&self, reference: &ResourceReference, css: CssProcessor<'_>) {
        match reference.kind {
            ResourceKind::Stylesheet => self.mirror_stylesheet(reference, css).await,
            _ => {
                self.session
                    .download_asset(&reference.resolved_url, &reference.local_path)
                    .await
            }
        }
    }

    /// Fetches a linked stylesheet, mirrors what it references and saves the
    /// rewritten text. Its `url()` tokens resolve against the stylesheet's own URL.
    async fn mirror_stylesheet(&self, reference: &ResourceReference, css: CssProcessor<'_>) {
        let url = &reference.resolved_url;

        let body = match self
            .session
            .downloader()
            .fetch_text(url, TextKind::Stylesheet)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                let target = self.session.files().resolve(&reference.local_path);
                self.session.record(DownloadOutcome::failure(url, &target, e));
                return;
            }
        };

        let rewritten = css.process(&body.text, url, DocumentLocation::Stylesheet).await;
        self.session
            .store(url, &reference.local_path, &body.encode(&rewritten))
            .await;
    }
}
