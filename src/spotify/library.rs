use std::{collections::HashSet, marker::PhantomData, time::Duration};

use async_trait::async_trait;
use indicatif::ProgressBar;
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    config,
    error::{ApiError, AuthError, Collection, FetchError, FetchFailure},
    spotify::client::LibraryApi,
    types::{Library, Paging, PlaylistObject, PlaylistRecord, SavedTrackObject, Token, TrackRecord},
    utils,
};

/// Hands out an access token that is valid for the next request.
///
/// The fetcher asks for a token before every request, retries included, so
/// an implementation that refreshes on expiry keeps a long walk authorized.
/// [`crate::spotify::auth::Authenticator`] is the implementation used by the
/// CLI; a plain [`Token`] works for short, one-off walks.
///
/// # Errors
///
/// Returns an [`AuthError`] when no valid token can be produced. The fetcher
/// reports it as [`FetchError::Auth`] and stops.
#[async_trait]
pub trait AccessTokenSource: Send {
    async fn access_token(&mut self) -> Result<Token, AuthError>;
}

/// A fixed token. Fails once the token expires instead of refreshing it.
#[async_trait]
impl AccessTokenSource for Token {
    async fn access_token(&mut self) -> Result<Token, AuthError> {
        if self.is_expired() {
            return Err(AuthError::Expired);
        }
        Ok(self.clone())
    }
}

/// A record type that one library collection yields.
///
/// Ties a record type to the [`Collection`] it is read from and to the way
/// the provider's paging object is decoded into records.
pub trait LibraryRecord: Sized + Send {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    /// Decodes a paging object into the number of raw items on the page and
    /// the records that could be built from them.
    ///
    /// The raw count includes items that were skipped, so a page of skipped
    /// items is never mistaken for the end of the collection.
    fn parse_page(page: Value) -> Result<(usize, Vec<Self>), serde_json::Error>;
}

impl LibraryRecord for PlaylistRecord {
    const COLLECTION: Collection = Collection::Playlists;

    fn id(&self) -> &str {
        &self.id
    }

    fn parse_page(page: Value) -> Result<(usize, Vec<Self>), serde_json::Error> {
        let page: Paging<PlaylistObject> = serde_json::from_value(page)?;
        let raw_count = page.items.len();
        let records = page
            .items
            .into_iter()
            .flatten()
            .map(|p| PlaylistRecord {
                id: p.id,
                name: p.name,
                track_count: p.tracks.map(|t| t.total).unwrap_or(0),
                owner: p.owner.display_name.unwrap_or(p.owner.id),
            })
            .collect();
        Ok((raw_count, records))
    }
}

impl LibraryRecord for TrackRecord {
    const COLLECTION: Collection = Collection::SavedTracks;

    fn id(&self) -> &str {
        &self.id
    }

    fn parse_page(page: Value) -> Result<(usize, Vec<Self>), serde_json::Error> {
        let page: Paging<SavedTrackObject> = serde_json::from_value(page)?;
        let raw_count = page.items.len();
        let records = page
            .items
            .into_iter()
            .flatten()
            .filter_map(|saved| {
                // local files and unavailable tracks come without a usable track id
                let track = saved.track?;
                Some(TrackRecord {
                    id: track.id?,
                    title: track.name,
                    artists: track.artists.into_iter().map(|a| a.name).collect(),
                    album: track.album.name,
                    added_at: saved.added_at,
                })
            })
            .collect();
        Ok((raw_count, records))
    }
}

/// How a failed page request is retried.
///
/// A page is retried at most once. The wait before the retry is the
/// provider's `Retry-After` when it sends one and `default_delay` otherwise.
///
/// # Fields
///
/// * `default_delay` - Wait used when the provider does not send `Retry-After`
/// * `max_delay` - Optional ceiling on the wait. `None` (the default) waits
///   out whatever the provider asks for; with `Some(limit)` a longer
///   `Retry-After` is reported as [`FetchError::RateLimited`] instead.
///
/// # Example
///
/// ```
/// let fetcher = LibraryFetcher::new(client).retry_policy(RetryPolicy {
///     default_delay: Duration::from_secs(1),
///     max_delay: Some(Duration::from_secs(30)),
/// });
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub default_delay: Duration,
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            default_delay: Duration::from_secs(1),
            max_delay: None,
        }
    }
}

/// Lazily walks one collection page by page.
///
/// Each call to [`Pager::next_page`] issues one request (two when the first
/// attempt fails and is retried) and yields the records of that page. The
/// walk ends after the first page that is shorter than the page size; an
/// empty page therefore ends it too. A pager cannot be restarted.
///
/// # Pagination
///
/// Requests use `offset` and `limit`. The offset advances by the number of
/// raw items on each page, skipped items included.
///
/// # Retries
///
/// Rate limiting (429), provider errors (5xx) and transport failures are
/// retried once after the wait given by the [`RetryPolicy`]. Other failures,
/// and a second failure on the same page, end the walk with a
/// [`FetchError`].
///
/// # Duplicates
///
/// Records whose id was already yielded by this pager are dropped; the first
/// occurrence wins.
pub struct Pager<'a, A: ?Sized, R> {
    api: &'a A,
    page_size: u32,
    retry: RetryPolicy,
    offset: u32,
    done: bool,
    seen: HashSet<String>,
    progress: Option<ProgressBar>,
    _record: PhantomData<R>,
}

impl<'a, A, R> Pager<'a, A, R>
where
    A: LibraryApi + ?Sized,
    R: LibraryRecord,
{
    /// Creates a pager positioned at the start of `R`'s collection.
    ///
    /// # Arguments
    ///
    /// * `api` - Client the pages are requested from
    /// * `page_size` - Items per request, clamped to 1..=50
    /// * `retry` - How failed requests are retried
    pub fn new(api: &'a A, page_size: u32, retry: RetryPolicy) -> Self {
        Pager {
            api,
            page_size: config::clamp_page_size(page_size),
            retry,
            offset: 0,
            done: false,
            seen: HashSet::new(),
            progress: None,
            _record: PhantomData,
        }
    }

    /// Shows rate-limit waits on the given spinner.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Offset of the next page to request.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Fetches the next page, or `None` once the collection is exhausted.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Asked for a valid access token before every attempt
    ///
    /// # Returns
    ///
    /// - `Ok(Some(records))` - Records of the next page, duplicates removed
    /// - `Ok(None)` - The previous page was the last one
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] tagged with the collection and offset when
    /// the page cannot be fetched or decoded, or when no token is available.
    /// The pager is finished afterwards.
    pub async fn next_page<T>(&mut self, tokens: &mut T) -> Result<Option<Vec<R>>, FetchError>
    where
        T: AccessTokenSource + ?Sized,
    {
        if self.done {
            return Ok(None);
        }

        let collection = R::COLLECTION;
        let page = self.request_with_retry(tokens).await?;
        let (raw_count, mut records) = match R::parse_page(page) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.done = true;
                return Err(FetchError::Decode {
                    collection,
                    offset: self.offset,
                    message: e.to_string(),
                });
            }
        };

        log::debug!(
            "{} page at offset {}: {} items, {} records",
            collection,
            self.offset,
            raw_count,
            records.len()
        );

        self.offset += raw_count as u32;
        if raw_count < self.page_size as usize {
            self.done = true;
        }

        utils::remove_duplicates_by(&mut records, &mut self.seen, |r| r.id());
        Ok(Some(records))
    }

    async fn request_with_retry<T>(&mut self, tokens: &mut T) -> Result<Value, FetchError>
    where
        T: AccessTokenSource + ?Sized,
    {
        let collection = R::COLLECTION;
        let mut retried = false;

        loop {
            // every attempt, retries included, asks for a token that is still valid
            let token = match tokens.access_token().await {
                Ok(token) => token,
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            };
            let result = self
                .api
                .get_page(
                    collection.path(),
                    &token.access_token,
                    self.offset,
                    self.page_size,
                )
                .await;

            let err = match result {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };

            if retried || !err.is_retryable() {
                self.done = true;
                return Err(FetchError::from_api(err, collection, self.offset));
            }

            let delay = match &err {
                ApiError::RateLimited {
                    retry_after: Some(after),
                } => *after,
                _ => self.retry.default_delay,
            };
            if self.retry.max_delay.is_some_and(|max| delay > max) {
                self.done = true;
                return Err(FetchError::from_api(err, collection, self.offset));
            }

            log::warn!(
                "{} at offset {} failed ({}), retrying in {}s",
                collection,
                self.offset,
                err,
                delay.as_secs()
            );
            if let Some(pb) = &self.progress {
                pb.set_message(format!(
                    "Rate limited by Spotify, waiting {}s before retrying {}...",
                    delay.as_secs(),
                    collection
                ));
            }
            sleep(delay).await;
            retried = true;
        }
    }
}

/// Fetches a user's playlists and saved tracks.
///
/// Wraps a [`LibraryApi`] with the page size, retry policy and optional
/// progress spinner used for every collection walk.
///
/// # Example
///
/// ```
/// let mut auth = Authenticator::new(settings.clone(), store, accounts, consent);
/// let fetcher = LibraryFetcher::new(SpotifyClient::new(&settings.api_url))
///     .page_size(settings.page_size)
///     .with_progress(utils::spinner("Fetching library..."));
///
/// match fetcher.fetch_all(&mut auth).await {
///     Ok(library) => println!("{} playlists", library.playlists.len()),
///     Err(failure) => println!("stopped early: {}", failure),
/// }
/// ```
pub struct LibraryFetcher<A> {
    api: A,
    page_size: u32,
    retry: RetryPolicy,
    progress: Option<ProgressBar>,
}

impl<A: LibraryApi> LibraryFetcher<A> {
    /// Creates a fetcher with a page size of 50 and the default retry policy.
    pub fn new(api: A) -> Self {
        LibraryFetcher {
            api,
            page_size: config::DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            progress: None,
        }
    }

    /// Sets the number of items per request, clamped to 1..=50.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = config::clamp_page_size(page_size);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reports the number of fetched records, and rate-limit waits, on the
    /// given spinner.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// A lazy pager over `R`'s collection using this fetcher's settings.
    pub fn pager<R: LibraryRecord>(&self) -> Pager<'_, A, R> {
        let pager = Pager::new(&self.api, self.page_size, self.retry);
        match &self.progress {
            Some(pb) => pager.with_progress(pb.clone()),
            None => pager,
        }
    }

    /// Fetches playlists, then saved tracks.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Source of access tokens, asked before every request
    ///
    /// # Returns
    ///
    /// The whole library with records in provider order and no duplicate ids
    /// within a collection.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchFailure`] holding the first [`FetchError`] and every
    /// record gathered before the failing page. Saved tracks are not
    /// requested when fetching playlists fails.
    pub async fn fetch_all<T>(&self, tokens: &mut T) -> Result<Library, FetchFailure>
    where
        T: AccessTokenSource + ?Sized,
    {
        let mut library = Library::default();

        if let Err(error) = self.drain(tokens, &mut library.playlists).await {
            return Err(FetchFailure {
                error,
                partial: library,
            });
        }
        if let Err(error) = self.drain(tokens, &mut library.tracks).await {
            return Err(FetchFailure {
                error,
                partial: library,
            });
        }

        Ok(library)
    }

    /// Fetches only the playlists; see [`LibraryFetcher::fetch_all`].
    pub async fn fetch_playlists<T>(&self, tokens: &mut T) -> Result<Vec<PlaylistRecord>, FetchFailure>
    where
        T: AccessTokenSource + ?Sized,
    {
        let mut playlists = Vec::new();
        match self.drain(tokens, &mut playlists).await {
            Ok(()) => Ok(playlists),
            Err(error) => Err(FetchFailure {
                error,
                partial: Library {
                    playlists,
                    tracks: Vec::new(),
                },
            }),
        }
    }

    /// Fetches only the saved tracks; see [`LibraryFetcher::fetch_all`].
    pub async fn fetch_saved_tracks<T>(&self, tokens: &mut T) -> Result<Vec<TrackRecord>, FetchFailure>
    where
        T: AccessTokenSource + ?Sized,
    {
        let mut tracks = Vec::new();
        match self.drain(tokens, &mut tracks).await {
            Ok(()) => Ok(tracks),
            Err(error) => Err(FetchFailure {
                error,
                partial: Library {
                    playlists: Vec::new(),
                    tracks,
                },
            }),
        }
    }

    async fn drain<T, R>(&self, tokens: &mut T, out: &mut Vec<R>) -> Result<(), FetchError>
    where
        T: AccessTokenSource + ?Sized,
        R: LibraryRecord,
    {
        let mut pager = self.pager::<R>();
        while let Some(records) = pager.next_page(tokens).await? {
            out.extend(records);
            if let Some(pb) = &self.progress {
                pb.set_message(format!("Fetched {} {}...", out.len(), R::COLLECTION));
            }
        }
        Ok(())
    }
}
