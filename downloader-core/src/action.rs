//! The tagged `Action` variant carried on the queue, plus its hashable
//! `RetryKey` projection used by the retry table and Active-Set checks
//! (spec §9 "Identifiers of mixed type across actions").

use std::hash::Hash;

/// One task on the action queue. Each variant carries the identifier type
/// that action operates on.
#[derive(Debug, Clone)]
pub enum Action {
    LoadWork(u64),
    DownloadWork(u64),
    LoadSeries(u64),
    LoadUserWorks(String),
    LoadUserBookmarks(String),
    LoadResultsList {
        url: String,
        start: u32,
        end: u32,
    },
    LoadResultsPage {
        url: String,
        page: u32,
    },
    Login {
        username: String,
        password: String,
    },
    /// Poison pill for clean shutdown; carries no identifier.
    Sentinel,
}

impl Action {
    /// The discriminant used by the observer protocol to route callbacks.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::LoadWork(_) => ActionKind::LoadWork,
            Action::DownloadWork(_) => ActionKind::DownloadWork,
            Action::LoadSeries(_) => ActionKind::LoadSeries,
            Action::LoadUserWorks(_) => ActionKind::LoadUserWorks,
            Action::LoadUserBookmarks(_) => ActionKind::LoadUserBookmarks,
            Action::LoadResultsList { .. } => ActionKind::LoadResultsList,
            Action::LoadResultsPage { .. } => ActionKind::LoadResultsPage,
            Action::Login { .. } => ActionKind::Login,
            Action::Sentinel => ActionKind::Sentinel,
        }
    }

    /// True for actions that are gated by Active Set membership (spec §4.4
    /// step 3: only `LoadWork`/`DownloadWork` are work-scoped).
    pub fn is_work_scoped(&self) -> bool {
        matches!(self, Action::LoadWork(_) | Action::DownloadWork(_))
    }

    /// The work-id this action is scoped to, if any.
    pub fn work_id(&self) -> Option<u64> {
        match self {
            Action::LoadWork(id) | Action::DownloadWork(id) => Some(*id),
            _ => None,
        }
    }

    /// The positional identifier callbacks receive first, per spec §4.7.
    pub fn identifier(&self) -> Identifier {
        match self {
            Action::LoadWork(id) | Action::DownloadWork(id) => Identifier::WorkId(*id),
            Action::LoadSeries(id) => Identifier::SeriesId(*id),
            Action::LoadUserWorks(user) | Action::LoadUserBookmarks(user) => {
                Identifier::Username(user.clone())
            }
            Action::LoadResultsList { url, .. } | Action::LoadResultsPage { url, .. } => {
                Identifier::ListingUrl(url.clone())
            }
            Action::Login { username, .. } => Identifier::Username(username.clone()),
            Action::Sentinel => Identifier::None,
        }
    }

    /// A hashable projection of this action used as the retry-table key.
    /// Credentials are stripped from `Login` since they must never be used
    /// as a hash/equality key or retained past the attempt that carries them.
    pub fn retry_key(&self) -> RetryKey {
        match self {
            Action::LoadWork(id) => RetryKey::LoadWork(*id),
            Action::DownloadWork(id) => RetryKey::DownloadWork(*id),
            Action::LoadSeries(id) => RetryKey::LoadSeries(*id),
            Action::LoadUserWorks(user) => RetryKey::LoadUserWorks(user.clone()),
            Action::LoadUserBookmarks(user) => RetryKey::LoadUserBookmarks(user.clone()),
            Action::LoadResultsList { url, start, end } => RetryKey::LoadResultsList {
                url: url.clone(),
                start: *start,
                end: *end,
            },
            Action::LoadResultsPage { url, page } => RetryKey::LoadResultsPage {
                url: url.clone(),
                page: *page,
            },
            Action::Login { username, .. } => RetryKey::Login(username.clone()),
            Action::Sentinel => RetryKey::Sentinel,
        }
    }
}

/// The identifier a callback's first positional argument carries, distinct
/// from `RetryKey` in that it identifies the *subject* of the action rather
/// than a hash key (no start/end/page disambiguation, no credentials ever).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    WorkId(u64),
    SeriesId(u64),
    Username(String),
    ListingUrl(String),
    None,
}

/// Discriminant used to route observer callbacks without a per-action-kind
/// map of closures (spec §9 "Dynamic callback dispatch").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    LoadWork,
    DownloadWork,
    LoadSeries,
    LoadUserWorks,
    LoadUserBookmarks,
    LoadResultsList,
    LoadResultsPage,
    Login,
    Sentinel,
}

/// Hashable, credential-free projection of an [`Action`], used to key the
/// retry table and to look identifiers up in the Active Set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RetryKey {
    LoadWork(u64),
    DownloadWork(u64),
    LoadSeries(u64),
    LoadUserWorks(String),
    LoadUserBookmarks(String),
    LoadResultsList { url: String, start: u32, end: u32 },
    LoadResultsPage { url: String, page: u32 },
    Login(String),
    Sentinel,
}
