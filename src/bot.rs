//! The public façade: every operation is wrapped as a deferred unit of
//! work and submitted through the action queue, so at most one operation
//! ever touches the shared session.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::info;

use crate::cache::ResultCache;
use crate::config::BotConfig;
use crate::error::{AutomationError, Error, Result, StateError};
use crate::loader::{self, LoaderSettings};
use crate::navigator::Navigator;
use crate::queue::ActionQueue;
use crate::session::chrome::ChromeSession;
use crate::session::{Search, Session, SessionBlob, page};
use crate::types::{
    Comment, DirectMessage, Identifier, ListKind, Post, PostDetails, SearchHit, User, UserDetails,
};

pub struct Bot<S: Session + Search + 'static = ChromeSession> {
    session: Arc<S>,
    config: Arc<BotConfig>,
    queue: ActionQueue,
    cache: Arc<RwLock<ResultCache>>,
    authenticated: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    auth_username: Arc<Mutex<Option<String>>>,
}

impl Bot<ChromeSession> {
    /// Launch a browser session and land on the site root.
    pub async fn launch(config: BotConfig) -> Result<Self> {
        let session = ChromeSession::launch(config.clone()).await?;
        Ok(Self::with_session(session, config))
    }

    /// Launch and restore a previously exported session blob, skipping the
    /// login form when the stored cookies are still valid.
    pub async fn launch_with_session(config: BotConfig, path: impl AsRef<Path>) -> Result<Self> {
        let bot = Self::launch(config).await?;
        bot.import_session(path).await?;
        Ok(bot)
    }
}

impl<S: Session + Search + 'static> Bot<S> {
    /// Wrap an already running session.
    pub fn with_session(session: S, config: BotConfig) -> Self {
        let queue = ActionQueue::new(config.queue_tick());
        Self {
            session: Arc::new(session),
            config: Arc::new(config),
            queue,
            cache: Arc::new(RwLock::new(ResultCache::empty())),
            authenticated: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(true)),
            auth_username: Arc::new(Mutex::new(None)),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Stop the action queue. The running operation finishes; pending
    /// operations are rejected.
    pub fn stop(&self) {
        self.queue.stop();
    }

    /// Close the browser session and stop the queue.
    pub async fn close(&self) -> Result<()> {
        self.ensure_running()?;
        let session = self.session.clone();
        let result = self.queue.enqueue(async move { session.close().await }).await;
        self.running.store(false, Ordering::SeqCst);
        self.queue.stop();
        result
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(StateError::NotRunning.into());
        }
        if self.queue.is_stopped() {
            return Err(StateError::QueueStopped.into());
        }
        Ok(())
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if !self.authenticated.load(Ordering::SeqCst) {
            return Err(StateError::NotAuthenticated.into());
        }
        Ok(())
    }

    // -- auth ---------------------------------------------------------------

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.ensure_running()?;
        let session = self.session.clone();
        let config = self.config.clone();
        let authenticated = self.authenticated.clone();
        let auth_username = self.auth_username.clone();
        let username = username.to_owned();
        let password = password.to_owned();

        self.queue
            .enqueue(async move {
                session.navigate(&home_link(&config.base_url)).await?;
                tokio::time::sleep(config.nav_delay()).await;
                page::dismiss_popups(&*session).await?;

                session
                    .wait_for_selector(page::USERNAME_FIELD, config.selector_timeout())
                    .await?;
                session.type_into(page::USERNAME_FIELD, &username).await?;
                session
                    .wait_for_selector(page::PASSWORD_FIELD, config.selector_timeout())
                    .await?;
                session.type_into(page::PASSWORD_FIELD, &password).await?;

                session
                    .click_first("button", &[("innerText", "Log In")])
                    .await?;
                tokio::time::sleep(config.nav_delay()).await;

                if let Some(kind) = page::detect_login_failure(&*session).await? {
                    return Err(Error::Login {
                        kind,
                        username: username.clone(),
                    });
                }

                authenticated.store(true, Ordering::SeqCst);
                *auth_username.lock().unwrap() = Some(username.clone());
                info!(%username, "logged in");
                Ok(())
            })
            .await
    }

    pub async fn logout(&self) -> Result<()> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        let session = self.session.clone();
        let config = self.config.clone();
        let authenticated = self.authenticated.clone();
        let auth_username = self.auth_username.clone();

        self.queue
            .enqueue(async move {
                let username = auth_username
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or(StateError::NotAuthenticated)?;

                session.navigate(&home_link(&config.base_url)).await?;
                tokio::time::sleep(config.nav_delay()).await;
                page::dismiss_popups(&*session).await?;

                let alt = format!("{username}'s profile picture");
                session
                    .click_first("[alt]", &[("alt", alt.as_str())])
                    .await?;
                session
                    .click_first("div", &[("innerText", "Log Out")])
                    .await?;

                authenticated.store(false, Ordering::SeqCst);
                *auth_username.lock().unwrap() = None;
                info!(%username, "logged out");
                Ok(())
            })
            .await
    }

    /// Check the rendered page for a login control and refresh the
    /// authenticated flag accordingly.
    pub async fn is_authenticated(&self) -> Result<bool> {
        self.ensure_running()?;
        let session = self.session.clone();
        let config = self.config.clone();
        let authenticated = self.authenticated.clone();

        self.queue
            .enqueue(async move {
                if !session.current_url().await?.starts_with(&config.base_url) {
                    session.navigate(&home_link(&config.base_url)).await?;
                    tokio::time::sleep(config.nav_delay()).await;
                }
                let logged_in = page::is_authenticated(&*session).await?;
                authenticated.store(logged_in, Ordering::SeqCst);
                Ok(logged_in)
            })
            .await
    }

    // -- search -------------------------------------------------------------

    pub async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        self.ensure_running()?;
        let session = self.session.clone();
        let term = term.to_owned();
        self.queue
            .enqueue(async move { session.search(&term).await })
            .await
    }

    // -- social graph -------------------------------------------------------

    pub async fn follow(&self, identifier: impl Into<Identifier>) -> Result<()> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        let identifier = identifier.into();
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;
                session
                    .click_first("button", &[("innerText", "Follow")])
                    .await?;
                session
                    .click_first("button", &[("innerText", "Follow Back")])
                    .await?;
                tokio::time::sleep(config.settle_delay()).await;
                Ok(())
            })
            .await
    }

    pub async fn unfollow(&self, identifier: impl Into<Identifier>) -> Result<()> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        let identifier = identifier.into();
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;
                // Covers the pending-request case before the regular one.
                session
                    .click_first("button", &[("innerText", "Requested")])
                    .await?;
                session.click_first(page::FOLLOWING_SYMBOL, &[]).await?;
                tokio::time::sleep(config.settle_delay()).await;
                // Confirmation popup.
                session
                    .click_first("button", &[("innerText", "Unfollow")])
                    .await?;
                tokio::time::sleep(config.settle_delay()).await;
                Ok(())
            })
            .await
    }

    pub async fn is_following(&self, identifier: impl Into<Identifier>) -> Result<bool> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        let identifier = identifier.into();
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;
                session.element_exists(page::FOLLOWING_SYMBOL, &[]).await
            })
            .await
    }

    pub async fn get_following(
        &self,
        identifier: impl Into<Identifier>,
        min_count: usize,
    ) -> Result<Vec<User>> {
        self.fetch_user_list(identifier.into(), ListKind::Following, min_count)
            .await
    }

    pub async fn get_follower(
        &self,
        identifier: impl Into<Identifier>,
        min_count: usize,
    ) -> Result<Vec<User>> {
        self.fetch_user_list(identifier.into(), ListKind::Follower, min_count)
            .await
    }

    async fn fetch_user_list(
        &self,
        identifier: Identifier,
        kind: ListKind,
        min_count: usize,
    ) -> Result<Vec<User>> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        let user = identifier.to_user(&self.config.base_url)?;

        {
            let cache = self.cache.read().unwrap();
            let cached = cache.lookup(&user, kind);
            if !cached.is_empty() && cached.len() >= min_count {
                return Ok(cached.to_vec());
            }
        }

        let session = self.session.clone();
        let config = self.config.clone();
        let username = user.username.clone();
        let op_identifier = identifier.clone();

        let list = self
            .queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&op_identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;

                let section = match kind {
                    ListKind::Following => format!("[href='/{username}/following/']"),
                    ListKind::Follower => format!("[href='/{username}/followers/']"),
                };
                // An unclickable list section means the account is private.
                if !session.click_first(&section, &[]).await? {
                    return Err(AutomationError::MissingElement { selector: section }.into());
                }
                tokio::time::sleep(config.nav_delay()).await;

                let session_ref = &*session;
                let base = config.base_url.as_str();
                loader::load(
                    session_ref,
                    Some(page::FOLLOW_LIST_ANCHOR),
                    move || page::extract_user_rows(session_ref, base),
                    |acc: &[User], candidate| acc.iter().any(|u| u.username == candidate.username),
                    min_count,
                    LoaderSettings::from(&*config),
                )
                .await
            })
            .await?;

        let mut cache = self.cache.write().unwrap();
        *cache = match kind {
            ListKind::Following => cache.add_following(&user, list.clone()),
            ListKind::Follower => cache.add_follower(&user, list.clone()),
        };
        Ok(list)
    }

    pub async fn get_user_details(
        &self,
        identifier: impl Into<Identifier>,
    ) -> Result<UserDetails> {
        self.ensure_running()?;
        let identifier = identifier.into();
        let user = identifier.to_user(&self.config.base_url)?;
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;
                page::extract_profile(&*session, &config.base_url, &user.username).await
            })
            .await
    }

    // -- posts --------------------------------------------------------------

    pub async fn get_posts(
        &self,
        identifier: impl Into<Identifier>,
        min_count: usize,
    ) -> Result<Vec<Post>> {
        self.ensure_running()?;
        let identifier = identifier.into();
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;

                let session_ref = &*session;
                let base = config.base_url.as_str();
                loader::load(
                    session_ref,
                    None,
                    move || page::extract_post_links(session_ref, base),
                    |acc: &[Post], candidate| acc.iter().any(|p| p.link == candidate.link),
                    min_count,
                    LoaderSettings::from(&*config),
                )
                .await
            })
            .await
    }

    pub async fn get_post_details(
        &self,
        identifier: impl Into<Identifier>,
    ) -> Result<PostDetails> {
        self.ensure_running()?;
        let identifier = identifier.into();
        let post = identifier.to_post()?;
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;

                let author = page::extract_post_author(&*session, &config.base_url).await?;
                let likes = page::extract_post_likes(&*session, &post.link).await?;
                Ok(PostDetails {
                    link: post.link.clone(),
                    author,
                    likes,
                })
            })
            .await
    }

    pub async fn like_post(&self, identifier: impl Into<Identifier>) -> Result<()> {
        self.post_reaction(identifier.into(), true).await
    }

    pub async fn unlike_post(&self, identifier: impl Into<Identifier>) -> Result<()> {
        self.post_reaction(identifier.into(), false).await
    }

    async fn post_reaction(&self, identifier: Identifier, like: bool) -> Result<()> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        identifier.to_post()?;
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;
                if like {
                    page::click_like(&*session).await
                } else {
                    page::click_unlike(&*session).await
                }
            })
            .await
    }

    pub async fn comment_post(
        &self,
        identifier: impl Into<Identifier>,
        comment: &str,
    ) -> Result<()> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        let identifier = identifier.into();
        identifier.to_post()?;
        let session = self.session.clone();
        let config = self.config.clone();
        let comment = comment.to_owned();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;

                session
                    .wait_for_selector(page::COMMENT_BOX, config.selector_timeout())
                    .await?;
                session.type_into(page::COMMENT_BOX, &comment).await?;
                session
                    .click_first("button", &[("innerHTML", "Post")])
                    .await?;
                tokio::time::sleep(config.settle_delay()).await;
                Ok(())
            })
            .await
    }

    pub async fn get_post_comments(
        &self,
        identifier: impl Into<Identifier>,
        min_count: usize,
    ) -> Result<Vec<Comment>> {
        self.ensure_running()?;
        let identifier = identifier.into();
        let post = identifier.to_post()?;
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;

                let session_ref = &*session;
                let base = config.base_url.as_str();
                let post_ref = &post;
                loader::load(
                    session_ref,
                    Some(page::COMMENT_ANCHOR),
                    move || page::extract_comment_rows(session_ref, base, post_ref),
                    |acc: &[Comment], candidate| {
                        acc.iter().any(|c| {
                            c.text == candidate.text
                                && c.author.username == candidate.author.username
                        })
                    },
                    min_count,
                    LoaderSettings::from(&*config),
                )
                .await
            })
            .await
    }

    // -- direct messages ----------------------------------------------------

    pub async fn send_direct_message(
        &self,
        identifier: impl Into<Identifier>,
        message: &str,
    ) -> Result<()> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        let identifier = identifier.into();
        let session = self.session.clone();
        let config = self.config.clone();
        let message = message.to_owned();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;

                if !session
                    .click_all("div", &[("innerText", "Message")])
                    .await?
                {
                    return Err(AutomationError::MissingElement {
                        selector: "div 'Message'".to_owned(),
                    }
                    .into());
                }
                tokio::time::sleep(config.nav_delay()).await;

                session
                    .wait_for_selector(page::MESSAGE_BOX, config.selector_timeout())
                    .await?;
                session.type_into(page::MESSAGE_BOX, &message).await?;

                if !session
                    .click_first("button", &[("innerText", "Send")])
                    .await?
                {
                    return Err(AutomationError::MissingElement {
                        selector: "button 'Send'".to_owned(),
                    }
                    .into());
                }
                tokio::time::sleep(config.settle_delay()).await;
                Ok(())
            })
            .await
    }

    pub async fn read_direct_messages(
        &self,
        identifier: impl Into<Identifier>,
        min_count: usize,
    ) -> Result<Vec<DirectMessage>> {
        self.ensure_running()?;
        self.ensure_authenticated()?;
        let identifier = identifier.into();
        let session = self.session.clone();
        let config = self.config.clone();

        self.queue
            .enqueue(async move {
                Navigator::new(&*session, &config).goto(&identifier).await?;
                tokio::time::sleep(config.settle_delay()).await;

                if !session
                    .click_all("div", &[("innerText", "Message")])
                    .await?
                {
                    return Err(AutomationError::MissingElement {
                        selector: "div 'Message'".to_owned(),
                    }
                    .into());
                }
                tokio::time::sleep(config.nav_delay()).await;

                let session_ref = &*session;
                // Older messages render when scrolling up, not down.
                let settings = LoaderSettings {
                    scroll_step: -config.scroll_step,
                    ..LoaderSettings::from(&*config)
                };
                loader::load(
                    session_ref,
                    None,
                    move || page::extract_messages(session_ref),
                    |acc: &[DirectMessage], candidate| acc.contains(candidate),
                    min_count,
                    settings,
                )
                .await
            })
            .await
    }

    // -- diagnostics & persistence ------------------------------------------

    pub async fn screenshot(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.ensure_running()?;
        let session = self.session.clone();
        let path = path.into();
        self.queue
            .enqueue(async move { session.screenshot(&path).await })
            .await
    }

    /// Write the session blob (`{ "cookies": [...] }`) to the given path.
    pub async fn export_session(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.ensure_running()?;
        let session = self.session.clone();
        let path = path.into();

        self.queue
            .enqueue(async move {
                let blob = SessionBlob {
                    cookies: session.cookies().await?,
                };
                std::fs::write(&path, serde_json::to_string_pretty(&blob)?)?;
                info!(path = %path.display(), "session exported");
                Ok(())
            })
            .await
    }

    /// Read a session blob from disk, install its cookies, reload the home
    /// surface and refresh the authenticated flag.
    pub async fn import_session(&self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_running()?;
        let blob: SessionBlob = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let session = self.session.clone();
        let config = self.config.clone();
        let authenticated = self.authenticated.clone();

        self.queue
            .enqueue(async move {
                session.set_cookies(&blob.cookies).await?;
                session.navigate(&home_link(&config.base_url)).await?;
                tokio::time::sleep(config.nav_delay()).await;
                let logged_in = page::is_authenticated(&*session).await?;
                authenticated.store(logged_in, Ordering::SeqCst);
                info!(logged_in, "session imported");
                Ok(())
            })
            .await
    }
}

fn home_link(base_url: &str) -> String {
    format!("{}/", base_url.trim_end_matches('/'))
}
