//! Presentation state holder.
//!
//! [`App`] never awaits the repository itself: [`App::dispatch`] spawns each
//! request onto a tokio task and the outcome comes back as an [`AppEvent`]
//! on the channel, to be applied with [`App::handle_event`].
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{HeadlinesQuery, SearchQuery};
use crate::repository::{Repository, RepositoryError};
use crate::storage::Article;

/// Which list the app is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Headlines,
    Search,
    Favorites,
    Recommendations,
}

impl View {
    pub fn label(self) -> &'static str {
        match self {
            View::Headlines => "Top headlines",
            View::Search => "Search results",
            View::Favorites => "Favorites",
            View::Recommendations => "Recommended for you",
        }
    }
}

/// A user-triggered repository operation.
#[derive(Debug, Clone)]
pub enum Request {
    Headlines(HeadlinesQuery),
    RefreshHeadlines(HeadlinesQuery),
    Search(SearchQuery),
    Favorites,
    Recommendations,
    ToggleFavorite(Article),
}

impl Request {
    /// The view a list request fills; `None` for mutations.
    fn view(&self) -> Option<View> {
        match self {
            Request::Headlines(_) | Request::RefreshHeadlines(_) => Some(View::Headlines),
            Request::Search(_) => Some(View::Search),
            Request::Favorites => Some(View::Favorites),
            Request::Recommendations => Some(View::Recommendations),
            Request::ToggleFavorite(_) => None,
        }
    }

    fn task_name(&self) -> &'static str {
        match self {
            Request::Headlines(_) => "headlines",
            Request::RefreshHeadlines(_) => "refresh_headlines",
            Request::Search(_) => "search",
            Request::Favorites => "favorites",
            Request::Recommendations => "recommendations",
            Request::ToggleFavorite(_) => "toggle_favorite",
        }
    }
}

#[derive(Debug)]
pub enum AppEvent {
    /// A list request finished.
    ///
    /// `generation` is the counter value when the request was dispatched;
    /// results from superseded requests are dropped.
    ArticlesLoaded {
        view: View,
        generation: u64,
        result: Result<Vec<Article>, RepositoryError>,
    },
    /// `Ok(None)` means the article was not cached and nothing changed.
    FavoriteToggled {
        url: String,
        result: Result<Option<Article>, RepositoryError>,
    },
    /// A background task panicked.
    ///
    /// `generation` is set for list requests and follows the same staleness
    /// rule as `ArticlesLoaded`; toggles carry `None`.
    TaskPanicked {
        task: &'static str,
        generation: Option<u64>,
        error: String,
    },
}

pub struct App {
    repository: Repository,
    event_tx: mpsc::Sender<AppEvent>,
    pub view: View,
    pub articles: Vec<Article>,
    pub loading: bool,
    pub status: Option<String>,
    /// Most recent failure, cleared by the next successful result.
    pub last_error: Option<String>,
    generation: u64,
    in_flight: usize,
}

impl App {
    pub fn new(repository: Repository, event_tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            repository,
            event_tx,
            view: View::Headlines,
            articles: Vec::new(),
            loading: false,
            status: None,
            last_error: None,
            generation: 0,
            in_flight: 0,
        }
    }

    /// True when every dispatched request has reported back.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    fn set_error(&mut self, message: String) {
        self.status = Some(message.clone());
        self.last_error = Some(message);
    }

    /// Run `request` on a background task.
    pub fn dispatch(&mut self, request: Request) -> JoinHandle<()> {
        let generation = if request.view().is_some() {
            self.generation = self.generation.wrapping_add(1);
            self.loading = true;
            self.generation
        } else {
            self.generation
        };
        self.in_flight += 1;

        let task = request.task_name();
        let list_generation = request.view().map(|_| generation);
        let repository = self.repository.clone();
        let tx = self.event_tx.clone();
        tracing::debug!(task, generation, "Dispatching request");

        tokio::spawn(async move {
            let tx_panic = tx.clone();
            match catch_task_panic(run_request(repository, request, generation, tx)).await {
                Ok(()) => {}
                Err(panic_msg) => {
                    tracing::error!(task, error = %panic_msg, "Background task panicked");
                    let _ = tx_panic
                        .send(AppEvent::TaskPanicked {
                            task,
                            generation: list_generation,
                            error: panic_msg,
                        })
                        .await;
                }
            }
        })
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match event {
            AppEvent::ArticlesLoaded {
                view,
                generation,
                result,
            } => {
                if generation != self.generation {
                    tracing::debug!(generation, current = self.generation, "Dropping stale result");
                    return;
                }
                self.loading = false;
                match result {
                    Ok(articles) => {
                        self.last_error = None;
                        self.view = view;
                        self.status = articles
                            .is_empty()
                            .then(|| format!("{}: nothing to show", view.label()));
                        self.articles = articles;
                    }
                    Err(e) => {
                        tracing::warn!(view = ?view, error = %e, "Request failed");
                        self.set_error(format!("Error: {e}"));
                    }
                }
            }
            AppEvent::FavoriteToggled { url, result } => match result {
                Ok(Some(updated)) => {
                    self.last_error = None;
                    self.apply_toggle(updated);
                }
                Ok(None) => {
                    self.last_error = None;
                    self.set_status(format!("Not in the local cache: {url}"));
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Favorite toggle failed");
                    self.set_error(format!("Error: {e}"));
                }
            },
            AppEvent::TaskPanicked {
                task,
                generation,
                error,
            } => {
                if let Some(generation) = generation {
                    if generation != self.generation {
                        tracing::debug!(task, generation, "Dropping panic from superseded request");
                        return;
                    }
                    self.loading = false;
                }
                self.set_error(format!("Internal error in {task}: {error}"));
            }
        }
    }

    fn apply_toggle(&mut self, updated: Article) {
        self.set_status(if updated.is_favorite {
            format!("Added to favorites: {}", updated.title)
        } else {
            format!("Removed from favorites: {}", updated.title)
        });

        if self.view == View::Favorites && !updated.is_favorite {
            self.articles.retain(|a| a.url != updated.url);
        } else if let Some(slot) = self.articles.iter_mut().find(|a| a.url == updated.url) {
            *slot = updated;
        } else if self.view == View::Favorites {
            self.articles.push(updated);
        }
    }
}

async fn run_request(
    repository: Repository,
    request: Request,
    generation: u64,
    tx: mpsc::Sender<AppEvent>,
) {
    let loaded = |view, result| AppEvent::ArticlesLoaded {
        view,
        generation,
        result,
    };
    let event = match request {
        Request::Headlines(query) => loaded(View::Headlines, repository.top_headlines(&query).await),
        Request::RefreshHeadlines(query) => loaded(
            View::Headlines,
            repository.refresh_top_headlines(&query).await,
        ),
        Request::Search(query) => loaded(View::Search, repository.search_articles(&query).await),
        Request::Favorites => loaded(View::Favorites, repository.favorite_articles().await),
        Request::Recommendations => loaded(
            View::Recommendations,
            repository.personalized_recommendations().await,
        ),
        Request::ToggleFavorite(article) => AppEvent::FavoriteToggled {
            result: repository.toggle_favorite(&article).await,
            url: article.url,
        },
    };

    if let Err(e) = tx.send(event).await {
        tracing::warn!(error = %e, "Channel send failed (receiver dropped)");
    }
}

/// Wraps a future to catch panics and convert them to errors.
///
/// Returns `Err(panic_message)` if the future panics, so a spawned task can
/// report the failure instead of silently disappearing.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}
