use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    store::{HealthStore, StoreError, SymptomOrder},
    types::{
        AnalyticsSnapshot, ChatRecord, ConditionCount, RawTimestamp, RiskDistribution, RiskLevel,
        SymptomRecord, TimelineDay, WeeklyActivity,
    },
};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The primary (symptom) read failed in a way the fallback could not
    /// recover. Distinguishes "could not fetch data" from "no data".
    #[error("analytics unavailable: could not read {collection} records")]
    Unavailable {
        collection: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Computes per-user analytics snapshots from the two stored collections.
/// Each call is independent; nothing is cached or persisted.
pub struct AnalyticsService {
    store: Arc<dyn HealthStore>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self { store }
    }

    pub async fn user_analytics(&self, user_id: &str) -> Result<AnalyticsSnapshot, AnalyticsError> {
        self.user_analytics_at(user_id, Utc::now()).await
    }

    /// `now` is injected so the snapshot is a pure function of the record
    /// collections and the clock.
    pub async fn user_analytics_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsSnapshot, AnalyticsError> {
        // Independent reads, no ordering dependency.
        let (symptoms, chats) = tokio::join!(
            self.fetch_symptom_records(user_id),
            self.store.chat_messages(user_id, None),
        );

        let symptoms = symptoms?;
        let chats = chats.unwrap_or_else(|error| {
            // Secondary read: degrade to an empty collection rather than
            // failing the whole snapshot.
            warn!(user_id, %error, "chat read failed; computing analytics from symptom data only");
            Vec::new()
        });

        Ok(compute_snapshot(&symptoms, &chats, now))
    }

    async fn fetch_symptom_records(
        &self,
        user_id: &str,
    ) -> Result<Vec<SymptomRecord>, AnalyticsError> {
        let ordered = self
            .store
            .symptom_records(user_id, SymptomOrder::NewestFirst)
            .await;

        let result = match ordered {
            Err(StoreError::QueryShape) => {
                debug!(user_id, "ordered symptom query rejected; retrying unordered");
                self.store
                    .symptom_records(user_id, SymptomOrder::Unordered)
                    .await
            }
            other => other,
        };

        result.map_err(|source| AnalyticsError::Unavailable {
            collection: "symptomAnalysis",
            source,
        })
    }
}

fn instant_of(created_at: Option<&RawTimestamp>) -> Option<DateTime<Utc>> {
    created_at.and_then(RawTimestamp::resolve)
}

/// Round-half-away-from-zero integer percentage. Zero total yields zero.
fn percentage(count: u32, total: u32) -> u32 {
    if total == 0 {
        0
    } else {
        (f64::from(count) * 100.0 / f64::from(total)).round() as u32
    }
}

fn risk_distribution(symptoms: &[SymptomRecord]) -> RiskDistribution {
    let (mut low, mut medium, mut high) = (0u32, 0u32, 0u32);
    for record in symptoms {
        // Absent or unrecognized levels are excluded from numerator and
        // denominator alike.
        match record
            .analysis
            .risk_level
            .as_deref()
            .and_then(RiskLevel::parse)
        {
            Some(RiskLevel::Low) => low += 1,
            Some(RiskLevel::Medium) => medium += 1,
            Some(RiskLevel::High) => high += 1,
            None => {}
        }
    }

    let classified = low + medium + high;
    // Independent rounding; the three may sum to 99 or 101.
    RiskDistribution {
        low: percentage(low, classified),
        medium: percentage(medium, classified),
        high: percentage(high, classified),
    }
}

fn top_conditions(symptoms: &[SymptomRecord]) -> Vec<ConditionCount> {
    let mut first_seen: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for record in symptoms {
        for condition in &record.analysis.conditions {
            let entry = counts.entry(condition.clone()).or_insert_with(|| {
                first_seen.push(condition.clone());
                0
            });
            *entry += 1;
        }
    }

    let mut ranked: Vec<ConditionCount> = first_seen
        .into_iter()
        .map(|condition| {
            let count = counts[&condition];
            ConditionCount { condition, count }
        })
        .collect();
    // Stable sort: ties keep first-observed order.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(5);
    ranked
}

/// Pure aggregation over the two collections; all date math is UTC.
pub fn compute_snapshot(
    symptoms: &[SymptomRecord],
    chats: &[ChatRecord],
    now: DateTime<Utc>,
) -> AnalyticsSnapshot {
    let total_sessions = symptoms.len();
    let total_chats = chats.len();

    let week_ago = now - Duration::days(7);
    let mut weekly_activity = WeeklyActivity::default();

    // Seven buckets, oldest first, ending on the date of `now`.
    let mut activity_timeline: Vec<TimelineDay> = Vec::with_capacity(7);
    let mut day_index: HashMap<NaiveDate, usize> = HashMap::new();
    for offset in (0..7).rev() {
        let date = (now - Duration::days(offset)).date_naive();
        day_index.insert(date, activity_timeline.len());
        activity_timeline.push(TimelineDay {
            day: date.format("%a").to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            symptoms: 0,
            chats: 0,
        });
    }

    for record in symptoms {
        if let Some(instant) = instant_of(record.created_at.as_ref()) {
            if instant >= week_ago {
                weekly_activity.symptoms += 1;
            }
            if let Some(&slot) = day_index.get(&instant.date_naive()) {
                activity_timeline[slot].symptoms += 1;
            }
        }
    }
    for record in chats {
        if let Some(instant) = instant_of(record.created_at.as_ref()) {
            if instant >= week_ago {
                weekly_activity.chats += 1;
            }
            if let Some(&slot) = day_index.get(&instant.date_naive()) {
                activity_timeline[slot].chats += 1;
            }
        }
    }

    // The store may have returned the fallback unordered read, so recency is
    // re-derived from the timestamps. Records without one sort last.
    let mut by_recency: Vec<&SymptomRecord> = symptoms.iter().collect();
    by_recency.sort_by_key(|record| std::cmp::Reverse(instant_of(record.created_at.as_ref())));
    let recent_symptoms = by_recency.into_iter().take(5).cloned().collect();

    AnalyticsSnapshot {
        total_sessions,
        total_chats,
        total_interactions: total_sessions + total_chats,
        risk_distribution: risk_distribution(symptoms),
        weekly_activity,
        top_conditions: top_conditions(symptoms),
        activity_timeline,
        recent_symptoms,
        has_data: total_sessions > 0 || total_chats > 0,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::types::{ChatKind, ChatRole, SymptomAnalysis};

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
    }

    fn symptom(days_ago: i64, risk: &str, conditions: &[&str]) -> SymptomRecord {
        let at = fixed_now() - Duration::days(days_ago);
        SymptomRecord {
            id: format!("s-{days_ago}-{risk}"),
            user_id: "u1".to_owned(),
            symptoms_text: "test symptoms".to_owned(),
            analysis: SymptomAnalysis {
                risk_level: if risk.is_empty() {
                    None
                } else {
                    Some(risk.to_owned())
                },
                advice: "rest".to_owned(),
                urgency: None,
                conditions: conditions.iter().map(|c| (*c).to_owned()).collect(),
            },
            created_at: Some(RawTimestamp::Epoch {
                seconds: at.timestamp(),
            }),
        }
    }

    fn chat(days_ago: i64) -> ChatRecord {
        let at = fixed_now() - Duration::days(days_ago);
        ChatRecord {
            id: format!("c-{days_ago}"),
            user_id: "u1".to_owned(),
            kind: ChatKind::Chat,
            role: ChatRole::User,
            message: "hello".to_owned(),
            created_at: Some(RawTimestamp::Iso(at.to_rfc3339())),
        }
    }

    #[test]
    fn risk_distribution_matches_classified_share() {
        // 6 low, 3 medium, 1 high, all today.
        let mut records = Vec::new();
        for _ in 0..6 {
            records.push(symptom(0, "low", &[]));
        }
        for _ in 0..3 {
            records.push(symptom(0, "medium", &[]));
        }
        records.push(symptom(0, "high", &[]));

        let snapshot = compute_snapshot(&records, &[], fixed_now());
        assert_eq!(snapshot.total_sessions, 10);
        assert_eq!(snapshot.risk_distribution, RiskDistribution {
            low: 60,
            medium: 30,
            high: 10
        });
        assert!(snapshot.has_data);
    }

    #[test]
    fn empty_input_yields_zeroed_snapshot() {
        let snapshot = compute_snapshot(&[], &[], fixed_now());
        assert!(!snapshot.has_data);
        assert_eq!(snapshot.total_interactions, 0);
        assert_eq!(snapshot.risk_distribution, RiskDistribution::default());
        assert_eq!(snapshot.activity_timeline.len(), 7);
        assert!(
            snapshot
                .activity_timeline
                .iter()
                .all(|day| day.symptoms == 0 && day.chats == 0)
        );
    }

    #[test]
    fn window_excludes_old_records_but_totals_keep_them() {
        let records = vec![symptom(10, "High", &[]), symptom(0, "low", &[])];

        let snapshot = compute_snapshot(&records, &[], fixed_now());
        assert_eq!(snapshot.total_sessions, 2);
        assert_eq!(snapshot.weekly_activity.symptoms, 1);
        assert_eq!(snapshot.risk_distribution, RiskDistribution {
            low: 50,
            medium: 0,
            high: 50
        });

        let today = snapshot.activity_timeline.last().unwrap();
        assert_eq!(today.symptoms, 1);
        let earlier: u32 = snapshot
            .activity_timeline
            .iter()
            .take(6)
            .map(|day| day.symptoms)
            .sum();
        assert_eq!(earlier, 0);
    }

    #[test]
    fn top_conditions_count_and_rank() {
        let records = vec![
            symptom(0, "low", &["Flu", "Cold"]),
            symptom(1, "low", &["Flu"]),
            symptom(2, "low", &["Flu", "Cold", "Fatigue"]),
        ];

        let snapshot = compute_snapshot(&records, &[], fixed_now());
        assert_eq!(snapshot.top_conditions, vec![
            ConditionCount {
                condition: "Flu".to_owned(),
                count: 3
            },
            ConditionCount {
                condition: "Cold".to_owned(),
                count: 2
            },
            ConditionCount {
                condition: "Fatigue".to_owned(),
                count: 1
            },
        ]);
    }

    #[test]
    fn top_conditions_break_ties_by_first_seen_and_truncate_to_five() {
        let records = vec![symptom(0, "low", &["A", "B", "C", "D", "E", "F"])];

        let snapshot = compute_snapshot(&records, &[], fixed_now());
        assert_eq!(snapshot.top_conditions.len(), 5);
        let names: Vec<&str> = snapshot
            .top_conditions
            .iter()
            .map(|entry| entry.condition.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
        assert!(
            snapshot
                .top_conditions
                .windows(2)
                .all(|pair| pair[0].count >= pair[1].count)
        );
    }

    #[test]
    fn timeline_is_seven_consecutive_days_ending_today() {
        let snapshot = compute_snapshot(&[], &[], fixed_now());
        let dates: Vec<NaiveDate> = snapshot
            .activity_timeline
            .iter()
            .map(|day| day.date.parse().unwrap())
            .collect();

        assert_eq!(dates.len(), 7);
        assert_eq!(*dates.last().unwrap(), fixed_now().date_naive());
        for pair in dates.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::days(1));
        }
        // 2025-03-15 is a Saturday.
        assert_eq!(snapshot.activity_timeline.last().unwrap().day, "Sat");
    }

    #[test]
    fn timeline_buckets_by_calendar_day_for_both_collections() {
        let records = vec![symptom(3, "low", &[]), symptom(3, "medium", &[])];
        let chats = vec![chat(3), chat(0)];

        let snapshot = compute_snapshot(&records, &chats, fixed_now());
        let three_ago = &snapshot.activity_timeline[3];
        assert_eq!(three_ago.symptoms, 2);
        assert_eq!(three_ago.chats, 1);
        assert_eq!(snapshot.activity_timeline[6].chats, 1);
        assert_eq!(snapshot.weekly_activity, WeeklyActivity {
            symptoms: 2,
            chats: 2
        });
    }

    #[test]
    fn malformed_records_count_in_totals_only() {
        let mut no_risk = symptom(0, "", &[]);
        no_risk.analysis.risk_level = None;
        let mut no_timestamp = symptom(0, "low", &[]);
        no_timestamp.created_at = None;
        let mut bad_timestamp = symptom(0, "unknown", &[]);
        bad_timestamp.created_at = Some(RawTimestamp::Iso("not a date".to_owned()));

        let snapshot = compute_snapshot(&[no_risk, no_timestamp, bad_timestamp], &[], fixed_now());
        assert_eq!(snapshot.total_sessions, 3);
        // Only the one classified record feeds the distribution.
        assert_eq!(snapshot.risk_distribution, RiskDistribution {
            low: 100,
            medium: 0,
            high: 0
        });
        // Timestampless records are invisible to the window and timeline.
        assert_eq!(snapshot.weekly_activity.symptoms, 1);
        let timeline_total: u32 = snapshot
            .activity_timeline
            .iter()
            .map(|day| day.symptoms)
            .sum();
        assert_eq!(timeline_total, 1);
    }

    #[test]
    fn rounding_tolerance_stays_within_one_of_hundred() {
        // 1/3 each rounds to 33+33+33 = 99.
        let records = vec![
            symptom(0, "low", &[]),
            symptom(0, "medium", &[]),
            symptom(0, "high", &[]),
        ];
        let snapshot = compute_snapshot(&records, &[], fixed_now());
        let dist = &snapshot.risk_distribution;
        let sum = dist.low + dist.medium + dist.high;
        assert_eq!((dist.low, dist.medium, dist.high), (33, 33, 33));
        assert!((99..=101).contains(&sum));
    }

    #[test]
    fn snapshot_is_deterministic_for_fixed_inputs() {
        let records = vec![
            symptom(0, "low", &["Flu", "Cold"]),
            symptom(2, "High", &["Flu"]),
            symptom(9, "medium", &[]),
        ];
        let chats = vec![chat(1), chat(8)];

        let first = compute_snapshot(&records, &chats, fixed_now());
        let second = compute_snapshot(&records, &chats, fixed_now());
        assert_eq!(first, second);
    }

    #[test]
    fn recent_symptoms_resorted_by_timestamp() {
        // Arrival order scrambled, as an unordered fallback read would give.
        let records = vec![
            symptom(5, "low", &[]),
            symptom(0, "low", &[]),
            symptom(3, "low", &[]),
        ];
        let snapshot = compute_snapshot(&records, &[], fixed_now());
        let ids: Vec<&str> = snapshot
            .recent_symptoms
            .iter()
            .map(|record| record.id.as_str())
            .collect();
        assert_eq!(ids, vec!["s-0-low", "s-3-low", "s-5-low"]);
    }

    /// Store double with scriptable failures for the fallback and
    /// degradation paths.
    struct ScriptedStore {
        symptoms: Vec<SymptomRecord>,
        chats: Vec<ChatRecord>,
        reject_ordered: bool,
        fail_symptoms: bool,
        fail_chats: bool,
        symptom_reads: AtomicUsize,
    }

    impl ScriptedStore {
        fn with_data(symptoms: Vec<SymptomRecord>, chats: Vec<ChatRecord>) -> Self {
            Self {
                symptoms,
                chats,
                reject_ordered: false,
                fail_symptoms: false,
                fail_chats: false,
                symptom_reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HealthStore for ScriptedStore {
        async fn save_symptom_record(
            &self,
            _user_id: &str,
            _symptoms_text: &str,
            _analysis: &SymptomAnalysis,
            _at: DateTime<Utc>,
        ) -> Result<String, StoreError> {
            unimplemented!("read-only double")
        }

        async fn save_chat_message(
            &self,
            _user_id: &str,
            _kind: ChatKind,
            _role: ChatRole,
            _message: &str,
            _at: DateTime<Utc>,
        ) -> Result<String, StoreError> {
            unimplemented!("read-only double")
        }

        async fn symptom_records(
            &self,
            _user_id: &str,
            order: SymptomOrder,
        ) -> Result<Vec<SymptomRecord>, StoreError> {
            self.symptom_reads.fetch_add(1, Ordering::Relaxed);
            if self.fail_symptoms {
                return Err(StoreError::Unavailable(anyhow::anyhow!("store down")));
            }
            if self.reject_ordered && order == SymptomOrder::NewestFirst {
                return Err(StoreError::QueryShape);
            }
            Ok(self.symptoms.clone())
        }

        async fn chat_messages(
            &self,
            _user_id: &str,
            _kind: Option<ChatKind>,
        ) -> Result<Vec<ChatRecord>, StoreError> {
            if self.fail_chats {
                return Err(StoreError::Unavailable(anyhow::anyhow!("chats down")));
            }
            Ok(self.chats.clone())
        }
    }

    #[tokio::test]
    async fn retries_unordered_when_ordered_query_is_rejected() {
        let store = Arc::new(ScriptedStore {
            reject_ordered: true,
            ..ScriptedStore::with_data(vec![symptom(0, "low", &[])], Vec::new())
        });
        let service = AnalyticsService::new(store.clone());

        let snapshot = service
            .user_analytics_at("u1", fixed_now())
            .await
            .expect("fallback read should succeed");
        assert_eq!(snapshot.total_sessions, 1);
        assert_eq!(store.symptom_reads.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn chat_read_failure_degrades_to_symptoms_only() {
        let store = Arc::new(ScriptedStore {
            fail_chats: true,
            ..ScriptedStore::with_data(vec![symptom(0, "low", &[])], vec![chat(0)])
        });
        let service = AnalyticsService::new(store);

        let snapshot = service
            .user_analytics_at("u1", fixed_now())
            .await
            .expect("chat failure must not abort");
        assert_eq!(snapshot.total_sessions, 1);
        assert_eq!(snapshot.total_chats, 0);
        assert!(snapshot.has_data);
    }

    #[tokio::test]
    async fn symptom_read_failure_surfaces_as_unavailable() {
        let store = Arc::new(ScriptedStore {
            fail_symptoms: true,
            ..ScriptedStore::with_data(Vec::new(), Vec::new())
        });
        let service = AnalyticsService::new(store);

        let error = service
            .user_analytics_at("u1", fixed_now())
            .await
            .expect_err("primary read failure must propagate");
        let AnalyticsError::Unavailable { collection, .. } = error;
        assert_eq!(collection, "symptomAnalysis");
    }

    #[tokio::test]
    async fn aggregates_over_in_memory_store() {
        use crate::store::InMemoryHealthStore;

        let store = Arc::new(InMemoryHealthStore::default());
        let analysis = SymptomAnalysis {
            risk_level: Some("Low".to_owned()),
            advice: "rest".to_owned(),
            urgency: None,
            conditions: vec!["Flu".to_owned()],
        };
        let now = fixed_now();
        store
            .save_symptom_record("u1", "cough", &analysis, now)
            .await
            .unwrap();
        store
            .save_chat_message("u1", ChatKind::Mental, ChatRole::User, "stressed", now)
            .await
            .unwrap();

        let service = AnalyticsService::new(store);
        let snapshot = service.user_analytics_at("u1", now).await.unwrap();
        assert_eq!(snapshot.total_interactions, 2);
        assert_eq!(snapshot.risk_distribution.low, 100);
        assert_eq!(snapshot.top_conditions[0].condition, "Flu");
        assert_eq!(snapshot.weekly_activity, WeeklyActivity {
            symptoms: 1,
            chats: 1
        });
    }
}
