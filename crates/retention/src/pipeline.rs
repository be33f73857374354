//! One retention pass over a parsed document.

use {
    dicelog_archive::LogArchive,
    dicelog_logbook::{LogDocument, LogEntry, LogFilters, Shaped},
    tracing::debug,
};

use crate::{
    limits::RetentionLimits,
    migrate::{MigrationAdapter, log_metadata},
    reconcile::reconcile_colors,
    report::{DocumentReport, TrimCounts},
    trim::trim_by_count,
};

#[derive(Debug, Default)]
struct EntryReport {
    counts: TrimCounts,
    anomalies: usize,
    migration_failed: bool,
}

/// Applies the retention steps to every log entry of a document.
///
/// Without an archive, overflow records are trimmed but not migrated.
pub struct DocumentPipeline<'a> {
    limits: RetentionLimits,
    archive: Option<&'a dyn LogArchive>,
}

impl<'a> DocumentPipeline<'a> {
    pub fn new(limits: RetentionLimits, archive: Option<&'a dyn LogArchive>) -> Self {
        Self { limits, archive }
    }

    /// Whether any well-formed collection in `doc` is over its capacity.
    ///
    /// Every step is a no-op within capacity, so `false` means [`Self::run`]
    /// would change nothing.
    pub fn exceeds_limits(&self, doc: &LogDocument) -> bool {
        let limits = &self.limits;
        let entries = doc
            .groups
            .values()
            .filter_map(Shaped::as_valid)
            .filter_map(|group| group.logs())
            .flat_map(|logs| logs.values().filter_map(Shaped::as_valid));

        for entry in entries {
            if entry.records().is_some_and(|r| r.len() > limits.records)
                || entry.color_map().is_some_and(|c| c.len() > limits.color_map)
            {
                return true;
            }
            let Some(stats) = entry.stats() else {
                continue;
            };
            if stats.participants().is_some_and(|p| p.len() > limits.participants) {
                return true;
            }
            let over_dice = stats.dice_faces().is_some_and(|faces| {
                faces
                    .values()
                    .filter_map(Shaped::as_valid)
                    .filter_map(|face| face.users())
                    .any(|users| users.len() > limits.dice_users)
            });
            if over_dice {
                return true;
            }
        }
        false
    }

    /// Mutate `doc` in place and report what changed.
    ///
    /// Groups, entries, and sub-structures with an unexpected shape are left
    /// as they are and counted as anomalies.
    pub async fn run(&self, doc: &mut LogDocument) -> DocumentReport {
        let mut report = DocumentReport::default();

        for (group_id, group) in doc.groups.iter_mut() {
            let Some(group) = group.as_valid_mut() else {
                debug!(group = %group_id, "group is not an object; skipped");
                report.anomalies += 1;
                continue;
            };
            report.groups += 1;

            if group.logs.as_ref().is_some_and(Shaped::is_malformed) {
                debug!(group = %group_id, "logs is not an object; skipped");
                report.anomalies += 1;
                continue;
            }
            let filters = group.filters();
            let Some(logs) = group.logs_mut() else {
                continue;
            };

            for (log_id, entry) in logs.iter_mut() {
                let Some(entry) = entry.as_valid_mut() else {
                    debug!(group = %group_id, log = %log_id, "log entry is not an object; skipped");
                    report.anomalies += 1;
                    continue;
                };
                report.logs += 1;

                let entry_report = self.process_entry(group_id, log_id, entry, &filters).await;
                report.counts += entry_report.counts;
                report.anomalies += entry_report.anomalies;
                if entry_report.migration_failed {
                    report.migration_failures += 1;
                }
            }
        }

        report
    }

    async fn process_entry(
        &self,
        group_id: &str,
        log_id: &str,
        entry: &mut LogEntry,
        filters: &LogFilters,
    ) -> EntryReport {
        let mut out = EntryReport::default();

        // Records: migrate the overflow, then keep the newest `limit`.
        if entry.records.as_ref().is_some_and(Shaped::is_malformed) {
            debug!(group = %group_id, log = %log_id, "records is not an array; skipped");
            out.anomalies += 1;
        }
        let excess = entry
            .records()
            .map_or(0, |r| r.len().saturating_sub(self.limits.records));
        if excess > 0 {
            let meta = log_metadata(group_id, log_id, entry, filters);
            if let Some(records) = entry.records_mut() {
                if let Some(archive) = self.archive {
                    let outcome = MigrationAdapter::new(archive)
                        .migrate(&meta, &records[..excess])
                        .await;
                    out.counts.records_migrated += outcome.inserted;
                    out.anomalies += outcome.malformed;
                    out.migration_failed = outcome.failed();
                }
                records.drain(..excess);
                out.counts.records_trimmed += excess;
            }
        }

        // Stats: participants, then each face's users.
        let mut active: Vec<String> = Vec::new();
        match entry.stats.as_mut() {
            Some(Shaped::Valid(stats)) => {
                match stats.participants.as_mut() {
                    Some(Shaped::Valid(participants)) => {
                        let trimmed = trim_by_count(participants, self.limits.participants);
                        if trimmed.dropped > 0 {
                            *participants = trimmed.kept;
                            out.counts.participants_trimmed += trimmed.dropped;
                        }
                        active = participants.keys().cloned().collect();
                    },
                    Some(Shaped::Malformed(_)) => {
                        debug!(log = %log_id, "stats.participants is not an object; skipped");
                        out.anomalies += 1;
                    },
                    None => {},
                }

                match stats.dice_faces.as_mut() {
                    Some(Shaped::Valid(faces)) => {
                        for (face_key, face) in faces.iter_mut() {
                            let Some(face) = face.as_valid_mut() else {
                                debug!(
                                    log = %log_id,
                                    face = %face_key,
                                    "dice face is not an object; skipped"
                                );
                                out.anomalies += 1;
                                continue;
                            };
                            match face.users.as_mut() {
                                Some(Shaped::Valid(users)) => {
                                    let trimmed = trim_by_count(users, self.limits.dice_users);
                                    if trimmed.dropped > 0 {
                                        *users = trimmed.kept;
                                        out.counts.dice_users_trimmed += trimmed.dropped;
                                    }
                                },
                                Some(Shaped::Malformed(_)) => {
                                    debug!(
                                        log = %log_id,
                                        face = %face_key,
                                        "dice users is not an object; skipped"
                                    );
                                    out.anomalies += 1;
                                },
                                None => {},
                            }
                        }
                    },
                    Some(Shaped::Malformed(_)) => {
                        debug!(log = %log_id, "stats.dice_faces is not an object; skipped");
                        out.anomalies += 1;
                    },
                    None => {},
                }
            },
            Some(Shaped::Malformed(_)) => {
                debug!(group = %group_id, log = %log_id, "stats is not an object; skipped");
                out.anomalies += 1;
            },
            None => {},
        }

        // Colors: keep post-trim participants first.
        match entry.color_map.as_mut() {
            Some(Shaped::Valid(colors)) => {
                let reconciled = reconcile_colors(
                    colors,
                    active.iter().map(String::as_str),
                    self.limits.color_map,
                );
                if reconciled.removed > 0 {
                    *colors = reconciled.kept;
                    out.counts.colors_trimmed += reconciled.removed;
                }
            },
            Some(Shaped::Malformed(_)) => {
                debug!(group = %group_id, log = %log_id, "color_map is not an object; skipped");
                out.anomalies += 1;
            },
            None => {},
        }

        out
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        dicelog_archive::SqliteLogArchive,
        dicelog_logbook::scalar,
        rstest::rstest,
        serde_json::{Map, Value, json},
    };

    fn records(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| {
                    json!({
                        "time": format!("2024/05/01 {:02}:{:02}:00", i / 60, i % 60),
                        "user_id": format!("u{}", i % 7),
                        "nickname": "player",
                        "content": format!("line {i}"),
                        "source": "user",
                        "message_id": format!("m{i}")
                    })
                })
                .collect(),
        )
    }

    fn ranked(n: usize) -> Value {
        Value::Object(
            (0..n)
                .map(|i| (format!("u{i}"), json!({"count": i, "nickname": format!("n{i}")})))
                .collect::<Map<_, _>>(),
        )
    }

    fn colors(n: usize) -> Value {
        Value::Object(
            (0..n)
                .map(|i| (format!("u{i}"), json!(format!("#{i:06x}"))))
                .collect::<Map<_, _>>(),
        )
    }

    fn doc(entry: Value) -> LogDocument {
        serde_json::from_value(json!({"g1": {"current": "", "logs": {"l1": entry}}})).unwrap()
    }

    fn entry(doc: &LogDocument) -> &LogEntry {
        doc.groups["g1"].as_valid().unwrap().logs().unwrap()["l1"]
            .as_valid()
            .unwrap()
    }

    async fn make_archive() -> SqliteLogArchive {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        dicelog_archive::run_migrations(&pool).await.unwrap();
        SqliteLogArchive::with_pool(pool)
    }

    #[tokio::test]
    async fn overflow_records_are_migrated_and_trimmed() {
        let archive = make_archive().await;
        let pipeline = DocumentPipeline::new(RetentionLimits::default(), Some(&archive));
        let mut doc = doc(json!({"name": "Long", "records": records(120)}));

        let report = pipeline.run(&mut doc).await;
        assert_eq!(report.counts.records_migrated, 70);
        assert_eq!(report.counts.records_trimmed, 70);

        let kept = entry(&doc).records().unwrap();
        assert_eq!(kept.len(), 50);
        let first = kept[0].as_valid().unwrap();
        assert_eq!(scalar(&first.content).map(String::as_str), Some("line 70"));
        assert_eq!(archive.count_records("l1").await.unwrap(), 70);
    }

    #[tokio::test]
    async fn trims_without_archive() {
        let pipeline = DocumentPipeline::new(RetentionLimits::default(), None);
        let mut doc = doc(json!({"records": records(51)}));

        let report = pipeline.run(&mut doc).await;
        assert_eq!(report.counts.records_migrated, 0);
        assert_eq!(report.counts.records_trimmed, 1);
        assert_eq!(entry(&doc).records().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn participants_and_dice_users_are_ranked() {
        let pipeline = DocumentPipeline::new(RetentionLimits::default(), None);
        let mut doc = doc(json!({
            "stats": {
                "messages": 10,
                "participants": ranked(600),
                "dice_faces": {"20": {"sum": 1, "count": 1, "users": ranked(150)}, "6": {"users": ranked(3)}}
            }
        }));

        let report = pipeline.run(&mut doc).await;
        assert_eq!(report.counts.participants_trimmed, 100);
        assert_eq!(report.counts.dice_users_trimmed, 50);

        let stats = entry(&doc).stats().unwrap();
        let participants = stats.participants().unwrap();
        assert_eq!(participants.len(), 500);
        assert!(participants.contains_key("u100"));
        assert!(!participants.contains_key("u99"));
        assert_eq!(stats.extra["messages"], json!(10));
    }

    #[tokio::test]
    async fn colors_follow_trimmed_participants() {
        let limits = RetentionLimits {
            participants: 2,
            color_map: 3,
            ..Default::default()
        };
        let pipeline = DocumentPipeline::new(limits, None);
        let mut doc = doc(json!({
            "stats": {"participants": {
                "u0": {"count": 1}, "u3": {"count": 9}, "u4": {"count": 5}
            }},
            "color_map": colors(5)
        }));

        let report = pipeline.run(&mut doc).await;
        assert_eq!(report.counts.participants_trimmed, 1);
        assert_eq!(report.counts.colors_trimmed, 2);

        let kept = entry(&doc).color_map.as_ref().unwrap().as_valid().unwrap();
        let keys: Vec<_> = kept.keys().map(String::as_str).collect();
        assert_eq!(keys, ["u3", "u4", "u0"]);
    }

    #[tokio::test]
    async fn malformed_stats_report_zero_and_do_not_fail() {
        let pipeline = DocumentPipeline::new(RetentionLimits::default(), None);
        let mut doc = doc(json!({"stats": ["not", "a", "map"], "records": records(3)}));

        let report = pipeline.run(&mut doc).await;
        assert_eq!(report.counts, TrimCounts::default());
        assert_eq!(report.anomalies, 1);
        assert_eq!(report.logs, 1);
    }

    #[tokio::test]
    async fn malformed_units_are_counted_and_left_alone() {
        let pipeline = DocumentPipeline::new(RetentionLimits::default(), None);
        let mut doc: LogDocument = serde_json::from_value(json!({
            "g1": {"logs": {"bad": 5, "good": {"records": records(60)}}},
            "g2": [],
            "g3": {"logs": "nope"}
        }))
        .unwrap();

        let report = pipeline.run(&mut doc).await;
        assert_eq!(report.groups, 2);
        assert_eq!(report.logs, 1);
        assert_eq!(report.anomalies, 3);
        assert_eq!(report.counts.records_trimmed, 10);
        assert_eq!(serde_json::to_value(&doc).unwrap()["g2"], json!([]));
    }

    #[tokio::test]
    async fn second_pass_changes_nothing() {
        let archive = make_archive().await;
        let pipeline = DocumentPipeline::new(RetentionLimits::default(), Some(&archive));
        let mut doc = doc(json!({
            "records": records(120),
            "stats": {"participants": ranked(600), "dice_faces": {"100": {"users": ranked(101)}}},
            "color_map": colors(700),
            "session_count": 4
        }));

        let first = pipeline.run(&mut doc).await;
        assert!(!first.counts.is_zero());
        let after_first = serde_json::to_value(&doc).unwrap();

        let second = pipeline.run(&mut doc).await;
        assert!(second.counts.is_zero(), "{:?}", second.counts);
        assert_eq!(serde_json::to_value(&doc).unwrap(), after_first);
        assert_eq!(after_first["g1"]["logs"]["l1"]["session_count"], json!(4));
    }

    #[rstest]
    #[case::empty(json!({}), false)]
    #[case::records_at_limit(json!({"records": records(50)}), false)]
    #[case::records_over(json!({"records": records(51)}), true)]
    #[case::participants_over(json!({"stats": {"participants": ranked(501)}}), true)]
    #[case::dice_users_over(json!({"stats": {"dice_faces": {"20": {"users": ranked(101)}}}}), true)]
    #[case::colors_over(json!({"color_map": colors(501)}), true)]
    #[case::malformed_records(json!({"records": {"0": 1}}), false)]
    fn over_limit_detection(#[case] body: Value, #[case] expected: bool) {
        let pipeline = DocumentPipeline::new(RetentionLimits::default(), None);
        assert_eq!(pipeline.exceeds_limits(&doc(body)), expected);
    }
}
