use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, RefKind};

// ---------------------------------------------------------------------------
// Profile / post references
// ---------------------------------------------------------------------------

/// A user reference as it appears in rendered lists and search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub link: String,
    pub username: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl User {
    pub fn new(link: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            username: username.into(),
            description: None,
        }
    }

    /// Build a user reference from a bare handle and the site base URL.
    pub fn from_username(base_url: &str, username: &str) -> Self {
        Self::new(profile_link(base_url, username), username)
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// A user profile with the counters read off the profile header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub link: String,
    pub username: String,
    #[serde(default)]
    pub description: Option<String>,
    pub posts: u64,
    pub followers: u64,
    pub following: u64,
}

impl UserDetails {
    pub fn user(&self) -> User {
        User::new(self.link.clone(), self.username.clone())
            .with_description(self.description.clone())
    }
}

/// One tile from the home-surface search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub link: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_hashtag: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub link: String,
}

impl Post {
    pub fn new(link: impl Into<String>) -> Self {
        Self { link: link.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDetails {
    pub link: String,
    pub author: User,
    #[serde(default)]
    pub likes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub author: User,
    pub post: Post,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub text: String,
    pub sent_by_user: bool,
}

/// Which of a user's relationship lists an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Following,
    Follower,
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Anything an operation accepts as a destination: a raw link, a bare
/// handle, or a structured reference carried over from an earlier result.
#[derive(Debug, Clone, PartialEq)]
pub enum Identifier {
    Link(String),
    Handle(String),
    User(User),
    SearchHit(SearchHit),
    Post(Post),
}

impl Identifier {
    /// The canonical destination link for this identifier. Structured
    /// references carry their own link; a raw link passes through; a bare
    /// handle expands to the canonical profile-link form.
    pub fn canonical_link(&self, base_url: &str) -> String {
        match self {
            Identifier::Link(link) => link.clone(),
            Identifier::Handle(handle) => profile_link(base_url, handle),
            Identifier::User(user) => user.link.clone(),
            Identifier::SearchHit(hit) => hit.link.clone(),
            Identifier::Post(post) => post.link.clone(),
        }
    }

    /// Whether the identifier carries an intrinsic destination. Only a bare
    /// handle needs search resolution before it can be navigated to.
    pub fn has_intrinsic_link(&self) -> bool {
        !matches!(self, Identifier::Handle(_))
    }

    /// The handle to feed into search resolution, if this identifier names
    /// one.
    pub fn handle(&self) -> Option<&str> {
        match self {
            Identifier::Handle(handle) => Some(handle),
            Identifier::User(user) => Some(&user.username),
            _ => None,
        }
    }

    /// Coerce the identifier into a user reference.
    ///
    /// Search hits that link to a hashtag refuse the coercion: a hashtag
    /// page has no profile behind it.
    pub fn to_user(&self, base_url: &str) -> Result<User, Error> {
        match self {
            Identifier::User(user) => Ok(user.clone()),
            Identifier::Handle(handle) => Ok(User::from_username(base_url, handle)),
            Identifier::SearchHit(hit) if !hit.is_hashtag => {
                Ok(User::new(hit.link.clone(), hit.title.clone())
                    .with_description(hit.description.clone()))
            }
            Identifier::Link(link) => match username_from_link(link) {
                Some(username) => Ok(User::new(link.clone(), username)),
                None => Err(self.conversion_error(RefKind::User)),
            },
            _ => Err(self.conversion_error(RefKind::User)),
        }
    }

    /// Coerce the identifier into a post reference.
    pub fn to_post(&self) -> Result<Post, Error> {
        match self {
            Identifier::Post(post) => Ok(post.clone()),
            Identifier::Link(link) => Ok(Post::new(link.clone())),
            _ => Err(self.conversion_error(RefKind::Post)),
        }
    }

    fn conversion_error(&self, target: RefKind) -> Error {
        Error::Conversion {
            identifier: self.clone(),
            target,
        }
    }
}

impl From<&str> for Identifier {
    fn from(raw: &str) -> Self {
        if raw.starts_with("https://") || raw.starts_with("http://") {
            Identifier::Link(raw.to_owned())
        } else {
            Identifier::Handle(strip_at(raw).to_owned())
        }
    }
}

impl From<String> for Identifier {
    fn from(raw: String) -> Self {
        Identifier::from(raw.as_str())
    }
}

impl From<User> for Identifier {
    fn from(user: User) -> Self {
        Identifier::User(user)
    }
}

impl From<&User> for Identifier {
    fn from(user: &User) -> Self {
        Identifier::User(user.clone())
    }
}

impl From<SearchHit> for Identifier {
    fn from(hit: SearchHit) -> Self {
        Identifier::SearchHit(hit)
    }
}

impl From<&SearchHit> for Identifier {
    fn from(hit: &SearchHit) -> Self {
        Identifier::SearchHit(hit.clone())
    }
}

impl From<Post> for Identifier {
    fn from(post: Post) -> Self {
        Identifier::Post(post)
    }
}

impl From<&Post> for Identifier {
    fn from(post: &Post) -> Self {
        Identifier::Post(post.clone())
    }
}

// ---------------------------------------------------------------------------
// Link helpers
// ---------------------------------------------------------------------------

/// Canonical profile link: `{base_url}/{username}/`.
pub fn profile_link(base_url: &str, username: &str) -> String {
    format!("{}/{}/", base_url.trim_end_matches('/'), username)
}

/// Extract the username from a canonical profile link (its first path
/// segment).
pub fn username_from_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    let segment = url.path_segments()?.find(|s| !s.is_empty())?;
    Some(segment.to_owned())
}

pub fn strip_at(username: &str) -> &str {
    username.strip_prefix('@').unwrap_or(username)
}
