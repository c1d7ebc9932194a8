//! User directory state: the resident page, paging, the fetch state
//! machine and the locally filtered view.
//!
//! Fetches run in two halves, [`Directory::begin_fetch`] and
//! [`Directory::complete_fetch`], tied together by a [`FetchTicket`]. Only
//! the most recently issued ticket may change the resident page; results
//! for older tickets are dropped. [`Directory::reset`] invalidates every
//! outstanding ticket.

use crate::api::UsersApi;
use crate::error::{DeleteError, HttpError, LoadFailed, UpdateError};
use crate::model::{FilterChange, FilterCriteria, User, UserPage, UserPatch};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Identifies one issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
    page: u32,
}

impl FetchTicket {
    pub fn page(&self) -> u32 {
        self.page
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded,
    Failed,
    /// A newer fetch was issued after this one; the result was dropped.
    Stale,
}

/// Counts for the "Showing X of Y users" line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSummary {
    pub shown: usize,
    pub resident: usize,
    pub page: u32,
    pub total_pages: u32,
}

#[derive(Debug)]
pub struct Directory {
    resident: UserPage,
    requested_page: u32,
    criteria: FilterCriteria,
    status: Status,
    error: Option<LoadFailed>,
    latest_seq: u64,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self {
            resident: UserPage::empty(),
            requested_page: 1,
            criteria: FilterCriteria::default(),
            status: Status::Idle,
            error: None,
            latest_seq: 0,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status == Status::Loading
    }

    pub fn error(&self) -> Option<LoadFailed> {
        self.error
    }

    pub fn page(&self) -> u32 {
        self.resident.page
    }

    pub fn requested_page(&self) -> u32 {
        self.requested_page
    }

    pub fn total_pages(&self) -> u32 {
        self.resident.total_pages
    }

    pub fn users(&self) -> &[User] {
        &self.resident.items
    }

    pub fn user(&self, id: u64) -> Option<&User> {
        self.resident.items.iter().find(|u| u.id == id)
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Clamp `n` into the known page range and start fetching it.
    pub fn select_page(&mut self, n: u32) -> FetchTicket {
        self.requested_page = n.clamp(1, self.resident.total_pages.max(1));
        self.begin_fetch()
    }

    /// Mark a fetch of the requested page as in flight. Resident users
    /// stay visible while loading.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.latest_seq += 1;
        self.status = Status::Loading;
        self.error = None;
        let ticket = FetchTicket {
            seq: self.latest_seq,
            page: self.requested_page,
        };
        debug!(seq = ticket.seq, page = ticket.page, "fetch started");
        ticket
    }

    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<UserPage, HttpError>,
    ) -> FetchOutcome {
        if ticket.seq != self.latest_seq {
            debug!(
                seq = ticket.seq,
                latest = self.latest_seq,
                page = ticket.page,
                "dropping stale page result"
            );
            return FetchOutcome::Stale;
        }

        match result {
            Ok(page) => {
                self.resident = page.normalized();
                self.requested_page = self.resident.page;
                self.status = Status::Ready;
                self.error = None;
                FetchOutcome::Loaded
            }
            Err(e) => {
                warn!(page = ticket.page, error = %e, "failed to load users");
                self.status = Status::Failed;
                self.error = Some(LoadFailed);
                FetchOutcome::Failed
            }
        }
    }

    /// Fetch the requested page and wait for it.
    pub fn fetch(&mut self, api: &dyn UsersApi, token: Option<&str>) -> Result<(), LoadFailed> {
        let ticket = self.begin_fetch();
        let result = api.list_users(token, ticket.page());
        match self.complete_fetch(ticket, result) {
            FetchOutcome::Failed => Err(LoadFailed),
            FetchOutcome::Loaded | FetchOutcome::Stale => Ok(()),
        }
    }

    pub fn set_page(
        &mut self,
        api: &dyn UsersApi,
        token: Option<&str>,
        n: u32,
    ) -> Result<(), LoadFailed> {
        let ticket = self.select_page(n);
        let result = api.list_users(token, ticket.page());
        match self.complete_fetch(ticket, result) {
            FetchOutcome::Failed => Err(LoadFailed),
            FetchOutcome::Loaded | FetchOutcome::Stale => Ok(()),
        }
    }

    /// Replace the filter criteria. Purely local.
    pub fn apply_filter(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
    }

    /// Change the search term and go back to page 1.
    pub fn search(
        &mut self,
        api: &dyn UsersApi,
        token: Option<&str>,
        text: &str,
    ) -> Result<(), LoadFailed> {
        let criteria = FilterCriteria {
            search_term: text.to_string(),
            ..self.criteria.clone()
        };
        self.apply_filter(criteria);
        self.set_page(api, token, 1)
    }

    /// Change one attribute filter and go back to page 1.
    pub fn set_filter(
        &mut self,
        api: &dyn UsersApi,
        token: Option<&str>,
        change: FilterChange,
    ) -> Result<(), LoadFailed> {
        let mut criteria = self.criteria.clone();
        criteria.apply_change(change);
        self.apply_filter(criteria);
        self.set_page(api, token, 1)
    }

    /// Resident users matching the current criteria, in page order.
    pub fn filtered(&self) -> Vec<&User> {
        self.resident
            .items
            .iter()
            .filter(|u| self.criteria.matches(u))
            .collect()
    }

    pub fn summary(&self) -> ViewSummary {
        ViewSummary {
            shown: self.filtered().len(),
            resident: self.resident.items.len(),
            page: self.resident.page,
            total_pages: self.resident.total_pages,
        }
    }

    /// Update a resident user remotely, then patch the local copy in place.
    pub fn update_user(
        &mut self,
        api: &dyn UsersApi,
        token: Option<&str>,
        id: u64,
        patch: &UserPatch,
    ) -> Result<User, UpdateError> {
        if let Some(field) = patch.missing_field() {
            return Err(UpdateError::MissingField(field));
        }
        let index = self
            .position(id)
            .ok_or(UpdateError::UnknownUser(id))?;

        let echo = api.update_user(token, id, patch).map_err(|e| {
            warn!(id, error = %e, "update rejected");
            UpdateError::RemoteRejected
        })?;

        let updated = echo.apply_to(&self.resident.items[index]);
        self.resident.items[index] = updated.clone();
        debug!(id, updated_at = ?echo.updated_at, "user updated locally");
        Ok(updated)
    }

    /// Delete a resident user remotely, then drop the local copy.
    pub fn delete_user(
        &mut self,
        api: &dyn UsersApi,
        token: Option<&str>,
        id: u64,
    ) -> Result<User, DeleteError> {
        let index = self.position(id).ok_or(DeleteError::UnknownUser(id))?;

        api.delete_user(token, id).map_err(|e| {
            warn!(id, error = %e, "delete rejected");
            DeleteError::RemoteRejected
        })?;

        debug!(id, "user removed locally");
        Ok(self.resident.items.remove(index))
    }

    /// Tear down: forget all data and ignore any fetch still in flight.
    pub fn reset(&mut self) {
        let latest_seq = self.latest_seq + 1;
        *self = Self::new();
        self.latest_seq = latest_seq;
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.resident.items.iter().position(|u| u.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LoginResponse;
    use crate::model::{user, UpdatedFields};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    /// Scripted users API: serves canned pages and records every call.
    #[derive(Default)]
    struct FakeApi {
        pages: HashMap<u32, UserPage>,
        fail_list: Cell<bool>,
        fail_writes: Cell<bool>,
        calls: RefCell<Vec<String>>,
        tokens: RefCell<Vec<Option<String>>>,
    }

    impl FakeApi {
        fn with_pages(pages: Vec<UserPage>) -> Self {
            Self {
                pages: pages.into_iter().map(|p| (p.page, p)).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, call: String, token: Option<&str>) {
            self.calls.borrow_mut().push(call);
            self.tokens.borrow_mut().push(token.map(str::to_string));
        }
    }

    impl UsersApi for FakeApi {
        fn login(&self, _: &str, _: &str) -> Result<LoginResponse, HttpError> {
            unreachable!("not used by the directory")
        }

        fn list_users(&self, token: Option<&str>, page: u32) -> Result<UserPage, HttpError> {
            self.record(format!("list {}", page), token);
            if self.fail_list.get() {
                return Err(HttpError::Status {
                    code: 500,
                    message: "boom".to_string(),
                });
            }
            self.pages
                .get(&page)
                .cloned()
                .ok_or_else(|| HttpError::Network("no such page".to_string()))
        }

        fn update_user(
            &self,
            token: Option<&str>,
            id: u64,
            patch: &UserPatch,
        ) -> Result<UpdatedFields, HttpError> {
            self.record(format!("update {}", id), token);
            if self.fail_writes.get() {
                return Err(HttpError::Status {
                    code: 401,
                    message: "unauthorized".to_string(),
                });
            }
            Ok(UpdatedFields {
                first_name: patch.first_name.clone(),
                last_name: patch.last_name.clone(),
                email: patch.email.clone(),
                updated_at: Some("2026-10-18T10:00:00.000Z".to_string()),
            })
        }

        fn delete_user(&self, token: Option<&str>, id: u64) -> Result<(), HttpError> {
            self.record(format!("delete {}", id), token);
            if self.fail_writes.get() {
                return Err(HttpError::Network("connection reset".to_string()));
            }
            Ok(())
        }
    }

    fn page(n: u32, total_pages: u32, items: Vec<User>) -> UserPage {
        UserPage {
            items,
            page: n,
            total_pages,
        }
    }

    fn two_pages() -> FakeApi {
        FakeApi::with_pages(vec![
            page(1, 2, vec![user(1, "George", "Bluth"), user(2, "Janet", "Weaver")]),
            page(2, 2, vec![user(7, "Michael", "Lawson"), user(8, "Lindsay", "Ferguson")]),
        ])
    }

    fn loaded(api: &FakeApi) -> Directory {
        let mut directory = Directory::new();
        directory.fetch(api, Some("tok")).unwrap();
        directory
    }

    #[test]
    fn test_initial_state_is_idle_and_empty() {
        let directory = Directory::new();
        assert_eq!(directory.status(), Status::Idle);
        assert!(directory.users().is_empty());
        assert_eq!((directory.page(), directory.total_pages()), (1, 1));
    }

    #[test]
    fn test_fetch_loads_page_and_forwards_token() {
        let api = two_pages();
        let directory = loaded(&api);

        assert_eq!(directory.status(), Status::Ready);
        assert!(!directory.is_loading());
        assert_eq!(directory.users().len(), 2);
        assert_eq!(directory.total_pages(), 2);
        assert_eq!(api.tokens.borrow()[0].as_deref(), Some("tok"));
    }

    #[test]
    fn test_set_page_clamps_to_known_range() {
        let api = two_pages();
        let mut directory = loaded(&api);

        directory.set_page(&api, Some("tok"), 9).unwrap();
        assert_eq!(directory.page(), 2);

        directory.set_page(&api, Some("tok"), 0).unwrap();
        assert_eq!(directory.page(), 1);

        assert_eq!(api.calls(), vec!["list 1", "list 2", "list 1"]);
    }

    #[test]
    fn test_set_page_before_any_fetch_stays_on_first_page() {
        let api = two_pages();
        let mut directory = Directory::new();

        directory.set_page(&api, None, 2).unwrap();
        assert_eq!(api.calls(), vec!["list 1"]);
    }

    #[test]
    fn test_out_of_order_responses_keep_latest_page() {
        let api = two_pages();
        let mut directory = loaded(&api);

        let first = directory.select_page(1);
        let second = directory.select_page(2);
        assert!(directory.is_loading());

        let outcome = directory.complete_fetch(second, api.list_users(None, second.page()));
        assert_eq!(outcome, FetchOutcome::Loaded);
        let outcome = directory.complete_fetch(first, api.list_users(None, first.page()));
        assert_eq!(outcome, FetchOutcome::Stale);

        assert_eq!(directory.page(), 2);
        assert_eq!(directory.users()[0].first_name, "Michael");
        assert_eq!(directory.status(), Status::Ready);
    }

    #[test]
    fn test_stale_result_does_not_end_loading() {
        let api = two_pages();
        let mut directory = loaded(&api);

        let first = directory.select_page(1);
        let _second = directory.select_page(2);
        directory.complete_fetch(first, api.list_users(None, 1));
        assert!(directory.is_loading());
    }

    #[test]
    fn test_failed_fetch_keeps_items_then_recovers() {
        let api = two_pages();
        let mut directory = loaded(&api);
        let before = directory.users().to_vec();

        api.fail_list.set(true);
        assert_eq!(directory.set_page(&api, Some("tok"), 2), Err(LoadFailed));
        assert_eq!(directory.status(), Status::Failed);
        assert_eq!(directory.error(), Some(LoadFailed));
        assert_eq!(directory.users(), before.as_slice());

        api.fail_list.set(false);
        directory.fetch(&api, Some("tok")).unwrap();
        assert_eq!(directory.error(), None);
        assert_eq!(directory.users()[0].first_name, "Michael");
    }

    #[test]
    fn test_begin_fetch_clears_previous_error() {
        let api = two_pages();
        let mut directory = loaded(&api);
        api.fail_list.set(true);
        let _ = directory.fetch(&api, None);

        directory.begin_fetch();
        assert_eq!(directory.error(), None);
        assert!(directory.is_loading());
        assert_eq!(directory.users().len(), 2);
    }

    #[test]
    fn test_filter_matches_search_and_active() {
        let mut ann = user(1, "Ann", "Smith");
        ann.active = Some(true);
        let mut bob = user(2, "Bob", "Jones");
        bob.active = Some(false);
        let api = FakeApi::with_pages(vec![page(1, 1, vec![ann, bob])]);
        let mut directory = loaded(&api);

        directory.search(&api, None, "an").unwrap();
        let names: Vec<_> = directory.filtered().iter().map(|u| u.id).collect();
        assert_eq!(names, vec![1]);

        directory
            .set_filter(&api, None, FilterChange::Active(Some(false)))
            .unwrap();
        assert!(directory.filtered().is_empty());
        assert_eq!(directory.criteria().search_term, "an");
    }

    #[test]
    fn test_apply_filter_is_local() {
        let api = two_pages();
        let mut directory = loaded(&api);

        directory.apply_filter(FilterCriteria {
            search_term: "JANET".to_string(),
            ..Default::default()
        });
        assert_eq!(directory.filtered().len(), 1);
        assert_eq!(
            directory.summary(),
            ViewSummary {
                shown: 1,
                resident: 2,
                page: 1,
                total_pages: 2
            }
        );
        assert_eq!(api.calls(), vec!["list 1"]);
    }

    #[test]
    fn test_filter_commands_return_to_first_page() {
        let api = two_pages();
        let mut directory = loaded(&api);
        directory.set_page(&api, None, 2).unwrap();

        directory
            .set_filter(&api, None, FilterChange::Role(Some("admin".to_string())))
            .unwrap();
        assert_eq!(directory.page(), 1);
        assert_eq!(api.calls(), vec!["list 1", "list 2", "list 1"]);
    }

    #[test]
    fn test_update_replaces_only_matching_entry() {
        let api = two_pages();
        let mut directory = loaded(&api);
        let untouched = directory.users()[1].clone();
        let patch = UserPatch {
            first_name: Some("X".to_string()),
            ..Default::default()
        };

        let updated = directory.update_user(&api, Some("tok"), 1, &patch).unwrap();
        assert_eq!(updated.first_name, "X");
        assert_eq!(updated.last_name, "Bluth");
        assert_eq!(directory.user(1).unwrap().first_name, "X");
        assert_eq!(directory.users()[1], untouched);
        assert_eq!(api.calls(), vec!["list 1", "update 1"]);
    }

    #[test]
    fn test_rejected_update_leaves_state_unchanged() {
        let api = two_pages();
        let mut directory = loaded(&api);
        let before = directory.users().to_vec();
        api.fail_writes.set(true);
        let patch = UserPatch {
            last_name: Some("Y".to_string()),
            ..Default::default()
        };

        assert_eq!(
            directory.update_user(&api, None, 2, &patch),
            Err(UpdateError::RemoteRejected)
        );
        assert_eq!(directory.users(), before.as_slice());
    }

    #[test]
    fn test_update_validates_before_calling_remote() {
        let api = two_pages();
        let mut directory = loaded(&api);
        let blank = UserPatch {
            email: Some(String::new()),
            ..Default::default()
        };
        let fine = UserPatch {
            email: Some("a@b.c".to_string()),
            ..Default::default()
        };

        assert_eq!(
            directory.update_user(&api, None, 1, &blank),
            Err(UpdateError::MissingField("email"))
        );
        assert_eq!(
            directory.update_user(&api, None, 99, &fine),
            Err(UpdateError::UnknownUser(99))
        );
        assert_eq!(api.calls(), vec!["list 1"]);
    }

    #[test]
    fn test_delete_removes_exactly_one_entry() {
        let api = two_pages();
        let mut directory = loaded(&api);

        let removed = directory.delete_user(&api, Some("tok"), 2).unwrap();
        assert_eq!(removed.first_name, "Janet");
        assert_eq!(directory.users().len(), 1);
        assert!(directory.user(2).is_none());
        assert_eq!(api.calls(), vec!["list 1", "delete 2"]);
    }

    #[test]
    fn test_rejected_delete_keeps_entry() {
        let api = two_pages();
        let mut directory = loaded(&api);
        api.fail_writes.set(true);

        assert_eq!(
            directory.delete_user(&api, None, 1),
            Err(DeleteError::RemoteRejected)
        );
        assert_eq!(directory.users().len(), 2);
        assert_eq!(
            directory.delete_user(&api, None, 42),
            Err(DeleteError::UnknownUser(42))
        );
    }

    #[test]
    fn test_reset_discards_in_flight_results() {
        let api = two_pages();
        let mut directory = loaded(&api);
        let ticket = directory.select_page(2);

        directory.reset();
        let outcome = directory.complete_fetch(ticket, api.list_users(None, 2));
        assert_eq!(outcome, FetchOutcome::Stale);
        assert_eq!(directory.status(), Status::Idle);
        assert!(directory.users().is_empty());
    }
}
