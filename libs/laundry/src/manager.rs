//! Slot booking manager
//!
//! Validates caller input, applies the booking policy and delegates each
//! atomic change to the injected [`SlotStore`]. Booking confirmations are
//! queued on the [`NotificationDispatcher`] only after the store has
//! committed.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::BookingConfig;
use crate::error::{FieldError, SlotError, SlotResult};
use crate::notify::{NotificationDispatcher, Notifier, booking_message, booking_notification};
use crate::slot::{Booking, BookingQuota, NewSlot, Slot, SlotView, Week};
use crate::store::SlotStore;
use crate::validation::{BookingDraft, NoticeDraft, SlotDraft, parse_date};

#[derive(Clone)]
pub struct SlotBookingManager {
    store: Arc<dyn SlotStore>,
    notifier: Arc<dyn Notifier>,
    notifications: NotificationDispatcher,
    config: BookingConfig,
    clock: Arc<dyn Clock>,
}

impl SlotBookingManager {
    /// Must be called inside a Tokio runtime; starts the notification worker
    ///
    /// The worker is detached, so confirmations still queued when the runtime
    /// stops are lost. Use [`SlotBookingManager::with_worker`] to drain them.
    pub fn new(
        store: Arc<dyn SlotStore>,
        notifier: Arc<dyn Notifier>,
        config: BookingConfig,
    ) -> Self {
        Self::with_worker(store, notifier, config).0
    }

    /// Like [`SlotBookingManager::new`], also returning the notification worker
    ///
    /// The worker finishes once every clone of the manager is dropped and the
    /// queue is empty; awaiting it delivers all pending confirmations.
    pub fn with_worker(
        store: Arc<dyn SlotStore>,
        notifier: Arc<dyn Notifier>,
        config: BookingConfig,
    ) -> (Self, JoinHandle<()>) {
        let (notifications, worker) = NotificationDispatcher::spawn(notifier.clone());
        let manager = Self {
            store,
            notifier,
            notifications,
            config,
            clock: Arc::new(SystemClock),
        };
        (manager, worker)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    pub async fn list_slots(&self) -> SlotResult<Vec<SlotView>> {
        self.store.list_slots().await
    }

    pub async fn student_bookings(&self, student_id: i64) -> SlotResult<Vec<SlotView>> {
        if student_id <= 0 {
            return Err(SlotError::Validation(vec![FieldError::new(
                "student_id",
                "must be a positive integer",
            )]));
        }
        self.store.student_bookings(student_id).await
    }

    pub async fn create_slot(&self, draft: SlotDraft) -> SlotResult<i64> {
        let slot = draft.validate()?;
        self.insert(&slot).await
    }

    async fn insert(&self, slot: &NewSlot) -> SlotResult<i64> {
        match self.store.create_slot(slot).await {
            Ok(id) => Ok(id),
            Err(err) => {
                warn!(
                    "Slot {} {} not created: {}",
                    slot.booking_date, slot.time_slot, err
                );
                Err(err)
            }
        }
    }

    /// One open slot per roster hour on `booking_date`
    ///
    /// Every hour is attempted on its own; hours created before a failure are
    /// kept.
    pub async fn create_full_day(&self, booking_date: Option<&str>) -> SlotResult<Vec<i64>> {
        let date = parse_date("booking_date", booking_date)
            .map_err(|e| SlotError::Validation(vec![e]))?;

        let mut created = Vec::new();
        let mut skipped = Vec::new();
        let mut store_error = None;

        for time in self.config.roster() {
            match self.insert(&NewSlot::open(date, time.clone())).await {
                Ok(id) => created.push(id),
                Err(SlotError::DuplicateSlot { .. }) => skipped.push(time),
                Err(err) => {
                    if store_error.is_none() {
                        store_error = Some(err);
                    }
                }
            }
        }

        info!(
            "Full-day roster for {}: {} created, {} already existed",
            date,
            created.len(),
            skipped.len()
        );

        if let Some(err) = store_error {
            return Err(err);
        }
        if !skipped.is_empty() {
            return Err(SlotError::FullDayIncomplete {
                date,
                created,
                skipped,
            });
        }
        Ok(created)
    }

    /// Returns the new `is_slot_open`
    pub async fn toggle_slot(&self, id: i64) -> SlotResult<bool> {
        let open = self.store.toggle_slot(id).await?;
        info!("Slot {} {}", id, if open { "opened" } else { "closed" });
        Ok(open)
    }

    /// Book a slot and queue the confirmation message
    pub async fn book_slot(&self, draft: BookingDraft) -> SlotResult<Booking> {
        let (student_id, slot_id) = draft.validate()?;

        let today = self.clock.today();
        let quota = BookingQuota {
            today,
            max_per_week: self.config.max_bookings_per_week,
            week: Week::containing(today),
            serialize_per_student: self.config.serialize_per_student,
        };

        let booking = match self.store.book_slot(student_id, slot_id, quota).await {
            Ok(booking) => booking,
            Err(err) => {
                warn!(
                    "Booking of slot {} by student {} rejected: {}",
                    slot_id, student_id, err
                );
                return Err(err);
            }
        };

        info!(
            "Slot {} booked by {} ({})",
            slot_id, booking.student.name, student_id
        );

        match booking_notification(&booking) {
            Some(notification) => self.notifications.dispatch(notification),
            None => info!(
                "No contact number for student {}, skipping confirmation",
                booking.student.name
            ),
        }

        Ok(booking)
    }

    /// Free a booked slot; when `student_id` is given it must be the holder
    pub async fn cancel_booking(&self, slot_id: i64, student_id: Option<i64>) -> SlotResult<Slot> {
        let slot = self.store.cancel_booking(slot_id, student_id).await?;
        info!("Booking on slot {} cancelled", slot_id);
        Ok(slot)
    }

    pub async fn delete_slot(&self, id: i64) -> SlotResult<()> {
        self.store.delete_slot(id).await?;
        info!("Deleted slot {}", id);
        Ok(())
    }

    /// Remove every slot dated before today, booked ones included
    pub async fn delete_expired_slots(&self) -> SlotResult<u64> {
        let today = self.clock.today();
        let deleted = self.store.delete_expired(today).await?;
        info!("Deleted {} slot(s) dated before {}", deleted, today);
        Ok(deleted)
    }

    /// Send a booking confirmation right away and report delivery failures
    pub async fn send_booking_notice(&self, draft: NoticeDraft) -> SlotResult<()> {
        let notice = draft.validate()?;
        let body = booking_message(&notice.name, &notice.day, &notice.time);
        self.notifier.send(&notice.contact, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::MemorySlotStore;
    use chrono::NaiveDate;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const TODAY: &str = "2024-06-10";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    struct Fixture {
        manager: SlotBookingManager,
        store: MemorySlotStore,
        notifier: Arc<RecordingNotifier>,
    }

    async fn fixture_with(config: BookingConfig, notifier: RecordingNotifier) -> Fixture {
        let store = MemorySlotStore::new();
        store.add_student(7, "Asha", Some("+911111111111")).await;
        store.add_student(8, "Ravi", Some("+922222222222")).await;
        store.add_student(9, "Meera", None).await;

        let notifier = Arc::new(notifier);
        let manager = SlotBookingManager::new(Arc::new(store.clone()), notifier.clone(), config)
            .with_clock(Arc::new(FixedClock(date(TODAY))));

        Fixture {
            manager,
            store,
            notifier,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(BookingConfig::default(), RecordingNotifier::default()).await
    }

    fn draft(day: &str, time: &str) -> SlotDraft {
        SlotDraft {
            booking_date: Some(day.into()),
            booking_day: None,
            time_slot: Some(time.into()),
            is_slot_open: Some(true),
        }
    }

    fn book(student_id: i64, slot_id: i64) -> BookingDraft {
        BookingDraft {
            student_id: Some(student_id),
            slot_id: Some(slot_id),
        }
    }

    async fn wait_for_messages(notifier: &RecordingNotifier, count: usize) {
        for _ in 0..100 {
            if notifier.sent.lock().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} notification(s)");
    }

    #[tokio::test]
    async fn duplicate_date_and_time_conflicts() {
        let f = fixture().await;
        let slot = SlotDraft {
            booking_day: Some("Monday".into()),
            ..draft("2024-06-10", "09:00")
        };

        let id = assert_ok!(f.manager.create_slot(slot.clone()).await);
        assert_eq!(id, 1);

        let err = assert_err!(f.manager.create_slot(slot).await);
        assert!(matches!(err, SlotError::DuplicateSlot { .. }));
        assert_eq!(f.manager.list_slots().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let f = fixture().await;
        let err = assert_err!(f.manager.create_slot(draft("2024-13-01", "9am")).await);

        assert!(matches!(err, SlotError::Validation(ref fields) if fields.len() == 2));
        assert!(f.manager.list_slots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn booking_closes_slot_and_returns_name() {
        let f = fixture().await;
        for time in ["09:00", "10:00", "11:00"] {
            f.manager.create_slot(draft("2024-06-12", time)).await.unwrap();
        }

        let booking = f.manager.book_slot(book(7, 3)).await.unwrap();
        assert_eq!(booking.student.name, "Asha");

        let slot = f.store.slot(3).await.unwrap();
        assert_eq!(slot.student_id, Some(7));
        assert!(!slot.is_slot_open);
    }

    #[tokio::test]
    async fn booking_sends_confirmation_after_commit() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        f.manager.book_slot(book(7, id)).await.unwrap();
        wait_for_messages(&f.notifier, 1).await;

        let sent = f.notifier.sent.lock().await;
        assert_eq!(sent[0].to, "+911111111111");
        assert!(sent[0].body.contains("Wednesday (2024-06-12)"));
        assert!(sent[0].body.contains("18:00"));
    }

    #[tokio::test]
    async fn student_without_contact_gets_no_message() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        f.manager.book_slot(book(9, id)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(f.notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_keeps_the_booking() {
        let f = fixture_with(BookingConfig::default(), RecordingNotifier::failing()).await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        assert_ok!(f.manager.book_slot(book(7, id)).await);
        wait_for_messages(&f.notifier, 1).await;

        assert_eq!(f.store.slot(id).await.unwrap().student_id, Some(7));
    }

    #[tokio::test]
    async fn unknown_student_or_slot_is_not_found() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        let err = assert_err!(f.manager.book_slot(book(42, id)).await);
        assert!(matches!(err, SlotError::StudentNotFound(42)));

        let err = assert_err!(f.manager.book_slot(book(7, 99)).await);
        assert!(matches!(err, SlotError::SlotNotFound(99)));
    }

    #[tokio::test]
    async fn closed_slot_cannot_be_booked() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();
        assert_eq!(f.manager.toggle_slot(id).await.unwrap(), false);

        let err = assert_err!(f.manager.book_slot(book(7, id)).await);
        assert!(matches!(err, SlotError::SlotClosed(_)));
    }

    #[tokio::test]
    async fn weekly_quota_applies_to_any_slot() {
        let f = fixture().await;
        let monday = f.manager.create_slot(draft("2024-06-10", "09:00")).await.unwrap();
        let friday = f.manager.create_slot(draft("2024-06-14", "09:00")).await.unwrap();
        let next_week = f.manager.create_slot(draft("2024-06-17", "09:00")).await.unwrap();

        f.manager.book_slot(book(7, monday)).await.unwrap();

        let err = assert_err!(f.manager.book_slot(book(7, friday)).await);
        assert!(matches!(err, SlotError::QuotaExceeded { limit: 1 }));
        assert!(f.store.slot(friday).await.unwrap().is_slot_open);

        // Only bookings dated in the current week count
        assert_ok!(f.manager.book_slot(book(7, next_week)).await);
    }

    #[tokio::test]
    async fn larger_quota_allows_more_bookings() {
        let config = BookingConfig {
            max_bookings_per_week: 2,
            ..BookingConfig::default()
        };
        let f = fixture_with(config, RecordingNotifier::default()).await;
        let ids = f.manager.create_full_day(Some("2024-06-11")).await.unwrap();

        assert_ok!(f.manager.book_slot(book(8, ids[0])).await);
        assert_ok!(f.manager.book_slot(book(8, ids[1])).await);
        let err = assert_err!(f.manager.book_slot(book(8, ids[2])).await);
        assert!(matches!(err, SlotError::QuotaExceeded { limit: 2 }));
    }

    #[tokio::test]
    async fn cancel_then_rebook_by_someone_else() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        f.manager.book_slot(book(7, id)).await.unwrap();
        let reopened = f.manager.cancel_booking(id, Some(7)).await.unwrap();
        assert!(reopened.is_slot_open);
        assert_eq!(reopened.student_id, None);

        f.manager.book_slot(book(8, id)).await.unwrap();
        assert_eq!(f.store.slot(id).await.unwrap().student_id, Some(8));
    }

    #[tokio::test]
    async fn cancel_requires_a_booking_by_the_caller() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        let err = assert_err!(f.manager.cancel_booking(id, None).await);
        assert!(matches!(err, SlotError::NotBooked(_)));

        f.manager.book_slot(book(7, id)).await.unwrap();
        let err = assert_err!(f.manager.cancel_booking(id, Some(8)).await);
        assert!(matches!(err, SlotError::NotBooked(_)));
        assert_eq!(f.store.slot(id).await.unwrap().student_id, Some(7));

        let err = assert_err!(f.manager.cancel_booking(404, None).await);
        assert!(matches!(err, SlotError::SlotNotFound(404)));
    }

    #[tokio::test]
    async fn booked_slot_cannot_be_toggled_or_deleted() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();
        f.manager.book_slot(book(7, id)).await.unwrap();
        let before = f.store.slot(id).await.unwrap();

        let err = assert_err!(f.manager.toggle_slot(id).await);
        assert!(matches!(err, SlotError::SlotBooked(_)));
        let err = assert_err!(f.manager.delete_slot(id).await);
        assert!(matches!(err, SlotError::SlotBooked(_)));

        assert_eq!(f.store.slot(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn toggle_flips_back_and_forth() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        assert!(!f.manager.toggle_slot(id).await.unwrap());
        assert!(f.manager.toggle_slot(id).await.unwrap());

        let err = assert_err!(f.manager.toggle_slot(404).await);
        assert!(matches!(err, SlotError::SlotNotFound(404)));
    }

    #[tokio::test]
    async fn delete_unbooked_slot() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        assert_ok!(f.manager.delete_slot(id).await);
        let err = assert_err!(f.manager.delete_slot(id).await);
        assert!(matches!(err, SlotError::SlotNotFound(_)));
    }

    #[tokio::test]
    async fn expired_cleanup_is_idempotent_and_drops_bookings() {
        let f = fixture().await;
        let past = f.manager.create_slot(draft("2024-06-03", "09:00")).await.unwrap();
        f.manager.create_slot(draft("2024-06-09", "09:00")).await.unwrap();
        f.manager.create_slot(draft(TODAY, "09:00")).await.unwrap();

        // Booked back when 2024-06-03 was still current
        let then = date("2024-06-03");
        let quota = BookingQuota {
            today: then,
            max_per_week: 1,
            week: Week::containing(then),
            serialize_per_student: false,
        };
        f.store.book_slot(7, past, quota).await.unwrap();

        assert_eq!(f.manager.delete_expired_slots().await.unwrap(), 2);
        assert_eq!(f.manager.delete_expired_slots().await.unwrap(), 0);
        assert_eq!(f.manager.list_slots().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_slots_cannot_be_booked() {
        let f = fixture().await;
        let first = f.manager.create_slot(draft("2024-05-01", "09:00")).await.unwrap();
        let second = f.manager.create_slot(draft("2024-05-02", "09:00")).await.unwrap();
        let current = f.manager.create_slot(draft("2024-06-11", "09:00")).await.unwrap();

        for id in [first, second] {
            let err = assert_err!(f.manager.book_slot(book(7, id)).await);
            assert!(matches!(err, SlotError::SlotClosed(_)));
        }
        assert_ok!(f.manager.book_slot(book(7, current)).await);

        let mine = f.manager.student_bookings(7).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, current);
    }

    #[tokio::test]
    async fn slot_dated_today_is_bookable() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft(TODAY, "20:00")).await.unwrap();
        assert_ok!(f.manager.book_slot(book(7, id)).await);
    }

    #[tokio::test]
    async fn worker_drains_queue_after_manager_is_dropped() {
        let store = MemorySlotStore::new();
        store.add_student(7, "Asha", Some("+911111111111")).await;
        store.add_student(8, "Ravi", Some("+922222222222")).await;
        let notifier = Arc::new(RecordingNotifier::default());

        let (manager, worker) = SlotBookingManager::with_worker(
            Arc::new(store),
            notifier.clone(),
            BookingConfig::default(),
        );
        let manager = manager.with_clock(Arc::new(FixedClock(date(TODAY))));
        for (student, time) in [(7, "09:00"), (8, "10:00")] {
            let id = manager.create_slot(draft("2024-06-12", time)).await.unwrap();
            manager.book_slot(book(student, id)).await.unwrap();
        }

        drop(manager);
        worker.await.unwrap();

        assert_eq!(notifier.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn nothing_expired_deletes_nothing() {
        let f = fixture().await;
        f.manager.create_full_day(Some("2024-06-20")).await.unwrap();

        assert_eq!(f.manager.delete_expired_slots().await.unwrap(), 0);
        assert_eq!(f.manager.list_slots().await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn full_day_creates_roster() {
        let f = fixture().await;
        let ids = f.manager.create_full_day(Some("2024-06-11")).await.unwrap();
        assert_eq!(ids.len(), 12);

        let slots = f.manager.list_slots().await.unwrap();
        let times: Vec<_> = slots.iter().map(|s| s.time_slot.as_str()).collect();
        assert_eq!(times.first(), Some(&"09:00"));
        assert_eq!(times.last(), Some(&"20:00"));
        assert!(slots.iter().all(|s| s.booking_day == "Tuesday" && s.is_slot_open));
    }

    #[tokio::test]
    async fn full_day_keeps_created_hours_when_some_exist() {
        let f = fixture().await;
        f.manager.create_slot(draft("2024-06-11", "12:00")).await.unwrap();

        let err = assert_err!(f.manager.create_full_day(Some("2024-06-11")).await);
        match err {
            SlotError::FullDayIncomplete {
                created, skipped, ..
            } => {
                assert_eq!(created.len(), 11);
                assert_eq!(skipped, vec!["12:00".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(f.manager.list_slots().await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn full_day_needs_a_date() {
        let f = fixture().await;
        let err = assert_err!(f.manager.create_full_day(None).await);
        assert!(matches!(err, SlotError::Validation(_)));
    }

    #[tokio::test]
    async fn concurrent_bookings_have_one_winner() {
        let f = fixture().await;
        let id = f.manager.create_slot(draft("2024-06-12", "18:00")).await.unwrap();

        let first = tokio::spawn({
            let manager = f.manager.clone();
            async move { manager.book_slot(book(7, id)).await }
        });
        let second = tokio::spawn({
            let manager = f.manager.clone();
            async move { manager.book_slot(book(8, id)).await }
        });

        let results = [first.await.unwrap(), second.await.unwrap()];
        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(SlotError::SlotClosed(_))))
        );

        let slot = f.store.slot(id).await.unwrap();
        assert_eq!(slot.student_id, Some(winners[0].student.id));
        assert!(!slot.is_slot_open);
    }

    #[tokio::test]
    async fn booked_slots_are_always_closed() {
        let config = BookingConfig {
            max_bookings_per_week: 3,
            ..BookingConfig::default()
        };
        let f = fixture_with(config, RecordingNotifier::default()).await;
        let ids = f.manager.create_full_day(Some("2024-06-12")).await.unwrap();

        f.manager.book_slot(book(7, ids[0])).await.unwrap();
        f.manager.book_slot(book(8, ids[1])).await.unwrap();
        f.manager.toggle_slot(ids[2]).await.unwrap();
        f.manager.cancel_booking(ids[0], None).await.unwrap();
        f.manager.book_slot(book(9, ids[3])).await.unwrap();

        for slot in f.manager.list_slots().await.unwrap() {
            if slot.student_id.is_some() {
                assert!(!slot.is_slot_open, "slot {} booked but open", slot.id);
            }
        }
    }

    #[tokio::test]
    async fn student_bookings_lists_only_their_slots() {
        let f = fixture().await;
        let ids = f.manager.create_full_day(Some("2024-06-12")).await.unwrap();
        f.manager.book_slot(book(7, ids[4])).await.unwrap();
        f.manager.book_slot(book(8, ids[5])).await.unwrap();

        let mine = f.manager.student_bookings(7).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, ids[4]);
        assert_eq!(mine[0].student_name.as_deref(), Some("Asha"));

        assert!(f.manager.student_bookings(0).await.is_err());
    }

    #[tokio::test]
    async fn manual_notice_reports_delivery_failure() {
        let notice = NoticeDraft {
            name: Some("Asha".into()),
            contact: Some("+911111111111".into()),
            day: Some("Monday".into()),
            time: Some("09:00".into()),
        };

        let f = fixture().await;
        assert_ok!(f.manager.send_booking_notice(notice.clone()).await);
        assert_eq!(f.notifier.sent.lock().await.len(), 1);

        let f = fixture_with(BookingConfig::default(), RecordingNotifier::failing()).await;
        let err = assert_err!(f.manager.send_booking_notice(notice).await);
        assert!(matches!(err, SlotError::Notification(_)));
    }
}
