//! Identifier resolution: turn any [`Identifier`] into a validated
//! on-screen destination, preferring cheaper strategies before expensive
//! ones.

use tracing::debug;

use crate::config::BotConfig;
use crate::error::{AutomationError, Error, Result};
use crate::session::{Search, Session, page};
use crate::types::Identifier;

/// The strategy that brought the session to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoStrategy {
    /// The session location already equalled the canonical link.
    AlreadyThere,
    /// A link to the destination was already rendered on the current page
    /// and was activated.
    LinkClickable,
    /// Navigated straight to the canonical link, then validated the
    /// destination exists.
    DirectNavigate,
    /// A bare handle was resolved through the home-surface search.
    SearchResolve,
}

pub struct Navigator<'a, S: Session + Search> {
    session: &'a S,
    config: &'a BotConfig,
}

impl<'a, S: Session + Search> Navigator<'a, S> {
    pub fn new(session: &'a S, config: &'a BotConfig) -> Self {
        Self { session, config }
    }

    /// Bring the session to the destination the identifier names.
    ///
    /// On success the session location equals the canonical link or a
    /// validated destination reached through search resolution. On failure
    /// the location is unspecified; callers must not assume a no-op.
    pub async fn goto(&self, identifier: &Identifier) -> Result<GotoStrategy> {
        match self.resolve(identifier, true).await {
            Ok(strategy) => {
                debug!(?strategy, ?identifier, "navigation complete");
                Ok(strategy)
            }
            Err(source) => Err(Error::navigation(identifier.clone(), source)),
        }
    }

    async fn resolve(&self, identifier: &Identifier, allow_search: bool) -> Result<GotoStrategy> {
        let link = identifier.canonical_link(&self.config.base_url);

        // Cheapest first: already on the destination.
        if self.session.current_url().await? == link {
            return Ok(GotoStrategy::AlreadyThere);
        }

        // A link already rendered on the current page.
        if self
            .session
            .click_first("a", &[("href", link.as_str())])
            .await?
        {
            tokio::time::sleep(self.config.nav_delay()).await;
            return Ok(GotoStrategy::LinkClickable);
        }

        // Identifiers carrying their own destination go straight there, as
        // does a handle whose search resolution already used up its retry.
        if identifier.has_intrinsic_link() || !allow_search {
            self.direct_navigate(&link).await?;
            return Ok(GotoStrategy::DirectNavigate);
        }

        // Bare handle: resolve through the home-surface search.
        let handle = identifier.handle().ok_or_else(|| {
            Error::Automation(AutomationError::Malformed(
                "identifier without link or handle".into(),
            ))
        })?;

        if !self
            .session
            .current_url()
            .await?
            .starts_with(&self.config.base_url)
        {
            self.session.navigate(&home_link(&self.config.base_url)).await?;
        }

        let hits = self.session.search(handle).await?;
        match hits.into_iter().find(|hit| hit.title == handle) {
            Some(hit) => {
                // Bounded to a single retry: the recursive resolution runs
                // with search disabled.
                Box::pin(self.resolve(&Identifier::SearchHit(hit), false)).await?;
                Ok(GotoStrategy::SearchResolve)
            }
            None => {
                self.direct_navigate(&link).await?;
                Ok(GotoStrategy::DirectNavigate)
            }
        }
    }

    /// Navigate straight to the link and validate the destination exists.
    async fn direct_navigate(&self, link: &str) -> Result<()> {
        self.session.navigate(link).await?;
        tokio::time::sleep(self.config.nav_delay()).await;
        if !page::destination_exists(self.session).await? {
            return Err(AutomationError::DestinationMissing {
                url: link.to_owned(),
            }
            .into());
        }
        Ok(())
    }
}

fn home_link(base_url: &str) -> String {
    format!("{}/", base_url.trim_end_matches('/'))
}
