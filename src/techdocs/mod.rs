//! Docs reader page: metadata loading, reader content state and layout.

pub mod api;
pub mod guard;
pub mod layout;
pub mod page;
pub mod reader;
pub mod route;

pub use api::{SyncResult, TechDocsApi, TechDocsClient, TechDocsStorageApi};
pub use guard::{FetchGuard, FetchKey, FetchStream};
pub use layout::{compose, LayoutOptions, PageBody, PageHeader, PageView, Severity, StatusIndicator};
pub use page::{Fetch, PageContext, PagePhase, Rendered, TechDocsPage, TechDocsPageHost};
pub use reader::{ReaderInput, ReaderState, ReaderStateController, ReaderStatus, SyncState};
pub use route::RouteParams;
