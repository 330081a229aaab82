//! The site page surface: selectors, sentinels, extraction scripts, and
//! page flows (search box, popups, login form).
//!
//! Everything in this module is deliberately site-specific and brittle;
//! the core consumes it only through the structured values it returns.

use serde::Deserialize;
use serde_json::Value;

use crate::config::BotConfig;
use crate::error::{AutomationError, LoginErrorKind, Result};
use crate::format::parse_count;
use crate::session::Session;
use crate::types::{Comment, DirectMessage, Post, SearchHit, User, UserDetails, profile_link};

// ---------------------------------------------------------------------------
// Selectors and anchors
// ---------------------------------------------------------------------------

pub(crate) const SEARCH_BOX: &str = "[placeholder='Search']";
pub(crate) const USERNAME_FIELD: &str = "[name='username']";
pub(crate) const PASSWORD_FIELD: &str = "[name='password']";
pub(crate) const COMMENT_BOX: &str = "[aria-label='Add a comment…']";
pub(crate) const MESSAGE_BOX: &str = "[placeholder='Message...']";
pub(crate) const LOAD_MORE_COMMENTS: &str = "[aria-label='Load more comments']";
pub(crate) const FOLLOWING_SYMBOL: &str = "[aria-label='Following']";

/// Scrollable region of the follower/following dialog.
pub(crate) const FOLLOW_LIST_ANCHOR: &str = ".isgrP";
/// Scrollable region of the comment list under a post.
pub(crate) const COMMENT_ANCHOR: &str = ".XQXOT";

// ---------------------------------------------------------------------------
// Page flows
// ---------------------------------------------------------------------------

/// Dismiss the cookie and notification popups, if present.
pub(crate) async fn dismiss_popups<S: Session + ?Sized>(session: &S) -> Result<()> {
    session.click_all("button", &[("innerText", "Accept All")]).await?;
    session.click_all("button", &[("innerText", "Not Now")]).await?;
    Ok(())
}

const DESTINATION_SENTINEL_JS: &str = r#"[...document.querySelectorAll('h2')].every((el) => el.innerHTML != "Sorry, this page isn't available.")"#;

/// Whether the current location renders actual content, as opposed to the
/// absence-of-content sentinel page.
pub(crate) async fn destination_exists<S: Session + ?Sized>(session: &S) -> Result<bool> {
    let value = session.evaluate(DESTINATION_SENTINEL_JS).await?;
    value
        .as_bool()
        .ok_or_else(|| malformed("destination sentinel", "expected a boolean"))
}

const CLEAR_SEARCH_JS: &str =
    r#"(() => { const el = document.querySelector("[placeholder='Search']"); if (el) el.value = ''; return true; })()"#;

const SEARCH_TILES_JS: &str = r#"[...document.querySelectorAll('.-qQT3')].map((element) => {
    const link = element.href;
    const title = element.querySelector('.uL8Hv').innerHTML;
    const isHashtag = title.startsWith('#');
    const raw = element.querySelector('._0PwGv');
    return { link, title, description: raw ? raw.innerText : null, isHashtag };
})"#;

#[derive(Debug, Deserialize)]
struct RawTile {
    link: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "isHashtag")]
    is_hashtag: bool,
}

/// The home-surface search flow: clear the box, type the term, harvest the
/// rendered result tiles.
pub(crate) async fn search<S: Session + ?Sized>(
    session: &S,
    config: &BotConfig,
    term: &str,
) -> Result<Vec<SearchHit>> {
    let current = session.current_url().await?;
    if !current.starts_with(&config.base_url) {
        session
            .navigate(&format!("{}/", config.base_url.trim_end_matches('/')))
            .await?;
    }

    session
        .wait_for_selector(SEARCH_BOX, config.selector_timeout())
        .await?;
    // Clear a term left over from an earlier search.
    session.evaluate(CLEAR_SEARCH_JS).await?;
    session.type_into(SEARCH_BOX, term).await?;
    tokio::time::sleep(config.nav_delay()).await;

    let value = session.evaluate(SEARCH_TILES_JS).await?;
    let tiles: Vec<RawTile> = parse("search tiles", value)?;
    Ok(tiles
        .into_iter()
        .map(|tile| SearchHit {
            link: tile.link,
            title: tile.title,
            description: tile.description,
            is_hashtag: tile.is_hashtag,
        })
        .collect())
}

const LOGIN_FAILURE_JS: &str = r#"(() => {
    const texts = [...document.querySelectorAll('p')].map((el) => el.innerHTML);
    if (texts.includes('Sorry, your password was incorrect. Please double-check your password.')) return 'wrong-credentials';
    if (texts.includes('Please wait a few minutes before you try again.')) return 'rate-limited';
    if (texts.includes("The username you entered doesn't belong to an account. Please check your username and try again.")) return 'account-not-found';
    const headings = [...document.querySelectorAll('h2')].map((el) => el.innerText);
    if (headings.includes('We Detected An Unusual Login Attempt')) return 'unusual-activity';
    return null;
})()"#;

/// Check the page for a login failure sentinel after submitting the form.
pub(crate) async fn detect_login_failure<S: Session + ?Sized>(
    session: &S,
) -> Result<Option<LoginErrorKind>> {
    let value = session.evaluate(LOGIN_FAILURE_JS).await?;
    let kind = match value.as_str() {
        None => None,
        Some("wrong-credentials") => Some(LoginErrorKind::WrongCredentials),
        Some("rate-limited") => Some(LoginErrorKind::RateLimited),
        Some("account-not-found") => Some(LoginErrorKind::AccountNotFound),
        Some("unusual-activity") => Some(LoginErrorKind::UnusualActivity),
        Some(other) => {
            return Err(malformed("login sentinel", other));
        }
    };
    Ok(kind)
}

/// Whether the session is logged in, judged by the absence of a rendered
/// login control.
pub(crate) async fn is_authenticated<S: Session + ?Sized>(session: &S) -> Result<bool> {
    let login_div = session
        .element_exists("div", &[("innerHTML", "Log In")])
        .await?;
    let login_button = session
        .element_exists("button", &[("innerHTML", "Log In")])
        .await?;
    Ok(!login_div && !login_button)
}

// ---------------------------------------------------------------------------
// List extraction
// ---------------------------------------------------------------------------

const USER_ROWS_JS: &str = r#"[...document.querySelector('.PZuss').children].map((element) => {
    const deepest = [];
    const traverse = (node) => {
        [...node.children].forEach((child) => {
            if (child.children.length > 0) { traverse(child); } else { deepest.push(child); }
        });
    };
    traverse(element);
    const username = [...element.querySelectorAll('a')].filter((el) => el.innerText)[0].innerText;
    const description = deepest
        .filter((el) => el.innerText)
        .filter((el) => !['Follow', 'Following', 'Requested', 'Verified'].includes(el.innerText))
        .filter((el) => el.innerText != username)
        .map((el) => el.innerText)[0] || null;
    return { username, description };
})"#;

#[derive(Debug, Deserialize)]
struct RawUserRow {
    username: String,
    #[serde(default)]
    description: Option<String>,
}

/// Read the rendered rows of the follower/following dialog.
pub(crate) async fn extract_user_rows<S: Session + ?Sized>(
    session: &S,
    base_url: &str,
) -> Result<Vec<User>> {
    let value = session.evaluate(USER_ROWS_JS).await?;
    let rows: Vec<RawUserRow> = parse("user rows", value)?;
    Ok(rows
        .into_iter()
        .map(|row| User::from_username(base_url, &row.username).with_description(row.description))
        .collect())
}

/// Read every rendered post link on a profile grid.
pub(crate) async fn extract_post_links<S: Session + ?Sized>(
    session: &S,
    base_url: &str,
) -> Result<Vec<Post>> {
    let prefix = format!("{}/p/", base_url.trim_end_matches('/'));
    let script = format!(
        "[...document.querySelectorAll('a')].filter((el) => el.href.startsWith('{prefix}')).map((el) => el.href)"
    );
    let value = session.evaluate(&script).await?;
    let links: Vec<String> = parse("post links", value)?;
    Ok(links.into_iter().map(Post::new).collect())
}

const PROFILE_COUNTERS_JS: &str = r#"(() => {
    const byHref = (suffix) => [...document.querySelectorAll('a')].filter((el) => el.href.endsWith(suffix))[0];
    const counters = document.querySelectorAll('.g47SY');
    const followersEl = byHref('/followers/');
    const followingEl = byHref('/following/');
    const bio = document.querySelector('.rhpdm');
    return {
        followers: followersEl ? followersEl.innerText : (counters[1] ? counters[1].innerText : null),
        following: followingEl ? followingEl.innerText : (counters[2] ? counters[2].innerText : null),
        posts: counters[0] ? counters[0].innerText : null,
        description: bio ? bio.innerText : null,
    };
})()"#;

#[derive(Debug, Deserialize)]
struct RawCounters {
    #[serde(default)]
    followers: Option<String>,
    #[serde(default)]
    following: Option<String>,
    #[serde(default)]
    posts: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Read the profile header counters off the currently open profile.
pub(crate) async fn extract_profile<S: Session + ?Sized>(
    session: &S,
    base_url: &str,
    username: &str,
) -> Result<UserDetails> {
    let value = session.evaluate(PROFILE_COUNTERS_JS).await?;
    let raw: RawCounters = parse("profile counters", value)?;

    let counter = |field: Option<String>, name: &str| -> Result<u64> {
        let text = field.ok_or_else(|| malformed("profile counters", name))?;
        Ok(parse_count(&text)?)
    };

    Ok(UserDetails {
        link: profile_link(base_url, username),
        username: username.to_owned(),
        description: raw.description,
        posts: counter(raw.posts, "posts counter missing")?,
        followers: counter(raw.followers, "followers counter missing")?,
        following: counter(raw.following, "following counter missing")?,
    })
}

const POST_AUTHOR_JS: &str = r#"(() => {
    const el = document.querySelectorAll('.sqdOP.yWX7d._8A5w5.ZIAjV')[0];
    return el ? el.innerText : null;
})()"#;

/// Read the author handle off the currently open post.
pub(crate) async fn extract_post_author<S: Session + ?Sized>(
    session: &S,
    base_url: &str,
) -> Result<User> {
    let value = session.evaluate(POST_AUTHOR_JS).await?;
    let username = value
        .as_str()
        .ok_or_else(|| malformed("post author", "author element not rendered"))?;
    Ok(User::from_username(base_url, username))
}

/// Read the like counter off the currently open post, if rendered.
pub(crate) async fn extract_post_likes<S: Session + ?Sized>(
    session: &S,
    post_link: &str,
) -> Result<Option<u64>> {
    let liked_by = format!("{}liked_by/", ensure_trailing_slash(post_link));
    let script = format!(
        "(() => (([...document.querySelectorAll('a')].reverse().find((a) => a.href == '{liked_by}') || null)?.children[0]?.innerText ?? null))()"
    );
    let value = session.evaluate(&script).await?;
    match value.as_str() {
        Some(text) => Ok(Some(parse_count(text)?)),
        None => Ok(None),
    }
}

const COMMENT_ROWS_JS: &str = r#"(() => {
    const box = document.querySelector('.XQXOT');
    if (!box) return [];
    return [...box.children]
        .filter((el, i) => i != 0)
        .map((element) => {
            const spans = [...element.querySelectorAll('span')]
                .filter((span) => span.children.length == 0)
                .filter((span) => !span.innerText.startsWith('View replies'))
                .filter((span) => span.innerText != 'Verified');
            const usernameEl = [...element.querySelectorAll('a')].filter((a) => a.children.length == 0)[0];
            return {
                username: usernameEl ? usernameEl.innerText : null,
                text: spans[0] ? spans[0].innerText : null,
            };
        });
})()"#;

#[derive(Debug, Deserialize)]
struct RawCommentRow {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Read the rendered comment rows under the currently open post. Rows the
/// page has not fully materialized yet come back incomplete and are
/// dropped.
pub(crate) async fn extract_comment_rows<S: Session + ?Sized>(
    session: &S,
    base_url: &str,
    post: &Post,
) -> Result<Vec<Comment>> {
    // Reveal another batch before reading, if the page offers it.
    session.click_all(LOAD_MORE_COMMENTS, &[]).await?;

    let value = session.evaluate(COMMENT_ROWS_JS).await?;
    let rows: Vec<RawCommentRow> = parse("comment rows", value)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match (row.username, row.text) {
            (Some(username), Some(text)) => Some(Comment {
                text,
                author: User::from_username(base_url, &username),
                post: post.clone(),
            }),
            _ => None,
        })
        .collect())
}

const LIKE_JS: &str = r#"[...document.querySelectorAll("[aria-label='Like']")].forEach((el) => el.parentElement.click())"#;

const UNLIKE_JS: &str = r#"[...document.querySelectorAll("[aria-label='Unlike']")].forEach((el) => el.parentElement.click())"#;

/// Activate the like control on the currently open post. A post that is
/// already liked renders no 'Like' control; the click is then a no-op.
pub(crate) async fn click_like<S: Session + ?Sized>(session: &S) -> Result<()> {
    session.evaluate(LIKE_JS).await?;
    Ok(())
}

pub(crate) async fn click_unlike<S: Session + ?Sized>(session: &S) -> Result<()> {
    session.evaluate(UNLIKE_JS).await?;
    Ok(())
}

const MESSAGE_ROWS_JS: &str = r#"(() => {
    return [...document.querySelectorAll("div[role='row']")]
        .map((row) => {
            const textEl = row.querySelector("div[dir='auto']");
            if (!textEl || !textEl.innerText) return null;
            const box = row.getBoundingClientRect();
            return { text: textEl.innerText, sentByUser: box.left > window.innerWidth / 3 };
        })
        .filter((row) => row);
})()"#;

#[derive(Debug, Deserialize)]
struct RawMessageRow {
    text: String,
    #[serde(rename = "sentByUser")]
    sent_by_user: bool,
}

/// Read the rendered bubbles of the currently open message thread. Sent
/// and received bubbles are told apart by their horizontal placement.
pub(crate) async fn extract_messages<S: Session + ?Sized>(
    session: &S,
) -> Result<Vec<DirectMessage>> {
    let value = session.evaluate(MESSAGE_ROWS_JS).await?;
    let rows: Vec<RawMessageRow> = parse("message rows", value)?;
    Ok(rows
        .into_iter()
        .map(|row| DirectMessage {
            text: row.text,
            sent_by_user: row.sent_by_user,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_trailing_slash(link: &str) -> String {
    if link.ends_with('/') {
        link.to_owned()
    } else {
        format!("{link}/")
    }
}

fn parse<T: serde::de::DeserializeOwned>(what: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| malformed(what, &e.to_string()))
}

fn malformed(what: &str, detail: &str) -> crate::error::Error {
    AutomationError::Malformed(format!("{what}: {detail}")).into()
}
