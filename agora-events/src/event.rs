//! Domain event definitions
//!
//! A [`DomainEvent`] is an immutable record of something that already happened.
//! Every event carries a typed [`EventPayload`]; the payload variant determines
//! the [`EventType`] tag used for routing. Payloads are validated when the event
//! is built, so an invalid event can never be observed.

use crate::error::{EventError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payload validation
pub trait Validate {
    /// Check the payload's own invariants
    fn validate(&self) -> Result<()>;
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EventError::invalid(format!("{field} is required")));
    }
    Ok(())
}

fn require_opt(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) => require(field, v),
        None => Ok(()),
    }
}

fn require_after(
    later_field: &str,
    later: DateTime<Utc>,
    earlier_field: &str,
    earlier: DateTime<Utc>,
) -> Result<()> {
    if later < earlier {
        return Err(EventError::invalid(format!(
            "{later_field} must not be before {earlier_field}"
        )));
    }
    Ok(())
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $tag:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $tag)]
                $variant,
            )+
        }

        impl $name {
            /// All declared values
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// String form
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = EventError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    other => Err(EventError::invalid(format!(
                        "{} must be one of [{}], got {:?}",
                        stringify!($name),
                        [$($tag),+].join(", "),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Reaction kinds a user can leave on a post
    ReactionKind {
        Like => "like",
        Love => "love",
        Laugh => "laugh",
        Wow => "wow",
        Sad => "sad",
        Angry => "angry",
    }
}

string_enum! {
    /// Where a post view originated
    ViewSource {
        Feed => "feed",
        Profile => "profile",
        Search => "search",
        Community => "community",
        Direct => "direct",
    }
}

string_enum! {
    /// How a user authenticated
    LoginMethod {
        Password => "password",
        Sso => "sso",
        Token => "token",
    }
}

string_enum! {
    /// Announcement audience
    Audience {
        All => "all",
        Students => "students",
        Faculty => "faculty",
        Staff => "staff",
    }
}

string_enum! {
    /// Role a member holds inside a community
    MemberRole {
        Member => "member",
        Moderator => "moderator",
        Admin => "admin",
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostCreated {
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<String>,
}

impl Validate for PostCreated {
    fn validate(&self) -> Result<()> {
        require("postId", &self.post_id)?;
        require("authorId", &self.author_id)?;
        require("content", &self.content)?;
        require_opt("communityId", self.community_id.as_deref())?;
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(EventError::invalid("tags must not contain empty values"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostUpdated {
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Validate for PostUpdated {
    fn validate(&self) -> Result<()> {
        require("postId", &self.post_id)?;
        require("authorId", &self.author_id)?;
        require("content", &self.content)?;
        require_after("updatedAt", self.updated_at, "createdAt", self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostDeleted {
    pub post_id: String,
    pub author_id: String,
    pub deleted_by: String,
}

impl Validate for PostDeleted {
    fn validate(&self) -> Result<()> {
        require("postId", &self.post_id)?;
        require("authorId", &self.author_id)?;
        require("deletedBy", &self.deleted_by)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostViewed {
    pub post_id: String,
    pub viewer_id: String,
    pub source: ViewSource,
}

impl Validate for PostViewed {
    fn validate(&self) -> Result<()> {
        require("postId", &self.post_id)?;
        require("viewerId", &self.viewer_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReactionAdded {
    pub reaction_id: String,
    pub post_id: String,
    pub user_id: String,
    pub kind: ReactionKind,
}

impl Validate for ReactionAdded {
    fn validate(&self) -> Result<()> {
        require("reactionId", &self.reaction_id)?;
        require("postId", &self.post_id)?;
        require("userId", &self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReactionRemoved {
    pub post_id: String,
    pub user_id: String,
    pub kind: ReactionKind,
}

impl Validate for ReactionRemoved {
    fn validate(&self) -> Result<()> {
        require("postId", &self.post_id)?;
        require("userId", &self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommentAdded {
    pub comment_id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<String>,
}

impl Validate for CommentAdded {
    fn validate(&self) -> Result<()> {
        require("commentId", &self.comment_id)?;
        require("postId", &self.post_id)?;
        require("authorId", &self.author_id)?;
        require("content", &self.content)?;
        require_opt("parentCommentId", self.parent_comment_id.as_deref())?;
        if self.parent_comment_id.as_deref() == Some(self.comment_id.as_str()) {
            return Err(EventError::invalid("a comment cannot reply to itself"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserRegistered {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
}

impl Validate for UserRegistered {
    fn validate(&self) -> Result<()> {
        require("userId", &self.user_id)?;
        require("email", &self.email)?;
        require("displayName", &self.display_name)?;
        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(EventError::invalid(format!(
                "email {:?} is not a valid address",
                self.email
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserLoggedIn {
    pub user_id: String,
    pub method: LoginMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl Validate for UserLoggedIn {
    fn validate(&self) -> Result<()> {
        require("userId", &self.user_id)?;
        require_opt("ipAddress", self.ip_address.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnnouncementPublished {
    pub announcement_id: String,
    pub author_id: String,
    pub title: String,
    pub audience: Audience,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Validate for AnnouncementPublished {
    fn validate(&self) -> Result<()> {
        require("announcementId", &self.announcement_id)?;
        require("authorId", &self.author_id)?;
        require("title", &self.title)?;
        if let Some(expires_at) = self.expires_at {
            require_after("expiresAt", expires_at, "publishedAt", self.published_at)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CampusEventCreated {
    pub campus_event_id: String,
    pub organizer_id: String,
    pub title: String,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Validate for CampusEventCreated {
    fn validate(&self) -> Result<()> {
        require("campusEventId", &self.campus_event_id)?;
        require("organizerId", &self.organizer_id)?;
        require("title", &self.title)?;
        require("location", &self.location)?;
        require_after("endsAt", self.ends_at, "startsAt", self.starts_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommunityJoined {
    pub community_id: String,
    pub user_id: String,
    pub role: MemberRole,
}

impl Validate for CommunityJoined {
    fn validate(&self) -> Result<()> {
        require("communityId", &self.community_id)?;
        require("userId", &self.user_id)
    }
}

// ============================================================================
// Event type / payload dispatch table
// ============================================================================

macro_rules! event_kinds {
    ($($variant:ident($payload:ty) => $tag:literal),+ $(,)?) => {
        /// Routing tag of a domain event
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventType {
            $($variant,)+
        }

        impl EventType {
            /// Every known event type
            pub const ALL: &'static [EventType] = &[$(EventType::$variant),+];

            /// Stable dotted tag, e.g. `post.created`
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventType::$variant => $tag,)+
                }
            }
        }

        impl FromStr for EventType {
            type Err = EventError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($tag => Ok(EventType::$variant),)+
                    other => Err(EventError::invalid(format!("unknown event type {other:?}"))),
                }
            }
        }

        /// Typed payload of a domain event, one variant per [`EventType`]
        #[derive(Debug, Clone, PartialEq)]
        pub enum EventPayload {
            $($variant($payload),)+
        }

        impl EventPayload {
            /// The routing tag for this payload
            pub fn event_type(&self) -> EventType {
                match self {
                    $(EventPayload::$variant(_) => EventType::$variant,)+
                }
            }

            /// Serialize the payload to a JSON object
            pub fn to_value(&self) -> Result<Value> {
                let value = match self {
                    $(EventPayload::$variant(p) => serde_json::to_value(p)?,)+
                };
                Ok(value)
            }

            /// Parse a JSON object as the payload for `event_type`
            pub fn from_value(event_type: EventType, data: Value) -> Result<Self> {
                if !data.is_object() {
                    return Err(EventError::invalid(format!(
                        "{event_type} payload must be an object"
                    )));
                }
                let parse_err = |e: serde_json::Error| {
                    EventError::invalid(format!("{event_type} payload: {e}"))
                };
                let payload = match event_type {
                    $(EventType::$variant => EventPayload::$variant(
                        serde_json::from_value::<$payload>(data).map_err(parse_err)?,
                    ),)+
                };
                Ok(payload)
            }
        }

        impl Validate for EventPayload {
            fn validate(&self) -> Result<()> {
                match self {
                    $(EventPayload::$variant(p) => p.validate(),)+
                }
            }
        }

        $(
            impl From<$payload> for EventPayload {
                fn from(payload: $payload) -> Self {
                    EventPayload::$variant(payload)
                }
            }
        )+
    };
}

event_kinds! {
    PostCreated(PostCreated) => "post.created",
    PostUpdated(PostUpdated) => "post.updated",
    PostDeleted(PostDeleted) => "post.deleted",
    PostViewed(PostViewed) => "post.viewed",
    ReactionAdded(ReactionAdded) => "reaction.added",
    ReactionRemoved(ReactionRemoved) => "reaction.removed",
    CommentAdded(CommentAdded) => "comment.added",
    UserRegistered(UserRegistered) => "user.registered",
    UserLoggedIn(UserLoggedIn) => "user.logged_in",
    AnnouncementPublished(AnnouncementPublished) => "announcement.published",
    CampusEventCreated(CampusEventCreated) => "campus_event.created",
    CommunityJoined(CommunityJoined) => "community.joined",
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Domain event
// ============================================================================

/// Immutable domain event
///
/// Fields are private; the only way to obtain a `DomainEvent` is through
/// [`DomainEvent::new`], [`DomainEvent::builder`] or [`DomainEvent::from_record`],
/// all of which validate.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    event_id: Uuid,
    occurred_at: DateTime<Utc>,
    user_id: Option<String>,
    correlation_id: Option<String>,
    causation_id: Option<Uuid>,
    version: u32,
    payload: EventPayload,
}

impl DomainEvent {
    /// Create a validated event occurring now
    pub fn new(payload: impl Into<EventPayload>) -> Result<Self> {
        Self::builder(payload).build()
    }

    /// Start building an event
    pub fn builder(payload: impl Into<EventPayload>) -> DomainEventBuilder {
        DomainEventBuilder::new(payload.into())
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// ID of the event that caused this one
    pub fn causation_id(&self) -> Option<Uuid> {
        self.causation_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Age of the event relative to `now`
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.occurred_at
    }

    /// Start a builder for an event caused by this one
    ///
    /// The new event inherits the correlation ID and acting user and records
    /// this event as its cause.
    pub fn caused(&self, payload: impl Into<EventPayload>) -> DomainEventBuilder {
        let mut builder = DomainEvent::builder(payload).causation_id(self.event_id);
        builder.correlation_id = self.correlation_id.clone();
        builder.user_id = self.user_id.clone();
        builder
    }

    /// Re-run every construction-time check against the current clock
    pub fn validate(&self) -> Result<()> {
        validate_envelope(
            self.event_id,
            self.occurred_at,
            self.user_id.as_deref(),
            self.correlation_id.as_deref(),
            self.version,
        )?;
        self.payload.validate()
    }

    /// Flatten to a serializable record
    pub fn to_record(&self) -> Result<EventRecord> {
        Ok(EventRecord {
            event_id: self.event_id.to_string(),
            event_type: self.event_type().as_str().to_string(),
            occurred_at: self
                .occurred_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            user_id: self.user_id.clone(),
            correlation_id: self.correlation_id.clone(),
            causation_id: self.causation_id.map(|id| id.to_string()),
            version: self.version,
            data: self.payload.to_value()?,
        })
    }

    /// Rebuild an event from its flat record, re-validating everything
    pub fn from_record(record: EventRecord) -> Result<Self> {
        let event_id = Uuid::parse_str(&record.event_id)
            .map_err(|e| EventError::invalid(format!("eventId: {e}")))?;
        let event_type = EventType::from_str(&record.event_type)?;
        let occurred_at = DateTime::parse_from_rfc3339(&record.occurred_at)
            .map_err(|e| EventError::invalid(format!("occurredAt: {e}")))?
            .with_timezone(&Utc);
        let causation_id = record
            .causation_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| EventError::invalid(format!("causationId: {e}")))?;
        let payload = EventPayload::from_value(event_type, record.data)?;

        let event = Self {
            event_id,
            occurred_at,
            user_id: record.user_id,
            correlation_id: record.correlation_id,
            causation_id,
            version: record.version,
            payload,
        };
        event.validate()?;
        Ok(event)
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_record()?)?)
    }

    /// Parse from a JSON string produced by [`DomainEvent::to_json`]
    pub fn from_json(json: &str) -> Result<Self> {
        let record: EventRecord = serde_json::from_str(json)
            .map_err(|e| EventError::invalid(format!("malformed event record: {e}")))?;
        Self::from_record(record)
    }
}

fn validate_envelope(
    event_id: Uuid,
    occurred_at: DateTime<Utc>,
    user_id: Option<&str>,
    correlation_id: Option<&str>,
    version: u32,
) -> Result<()> {
    if event_id.is_nil() {
        return Err(EventError::invalid("eventId must not be nil"));
    }
    if occurred_at > Utc::now() {
        return Err(EventError::invalid(format!(
            "occurredAt {} is in the future",
            occurred_at.to_rfc3339()
        )));
    }
    if version == 0 {
        return Err(EventError::invalid("version must be at least 1"));
    }
    require_opt("userId", user_id)?;
    require_opt("correlationId", correlation_id)
}

/// Builder for [`DomainEvent`]
#[derive(Debug, Clone)]
pub struct DomainEventBuilder {
    payload: EventPayload,
    occurred_at: Option<DateTime<Utc>>,
    user_id: Option<String>,
    correlation_id: Option<String>,
    causation_id: Option<Uuid>,
    version: u32,
}

impl DomainEventBuilder {
    fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            occurred_at: None,
            user_id: None,
            correlation_id: None,
            causation_id: None,
            version: 1,
        }
    }

    /// Set the acting user
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the correlation ID
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the causation ID
    pub fn causation_id(mut self, id: Uuid) -> Self {
        self.causation_id = Some(id);
        self
    }

    /// Set the schema version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set when the event occurred (defaults to now)
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Validate and build the event
    pub fn build(self) -> Result<DomainEvent> {
        let event = DomainEvent {
            event_id: Uuid::new_v4(),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            user_id: self.user_id,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            version: self.version,
            payload: self.payload,
        };
        event.validate()?;
        Ok(event)
    }
}

/// Flat, serializable form of a [`DomainEvent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: String,
    pub event_type: String,
    /// RFC 3339 / ISO-8601 timestamp
    pub occurred_at: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    pub version: u32,
    pub data: Value,
}
