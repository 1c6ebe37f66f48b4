use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by quests and tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Todo,
    Ready,
    InProgress,
    Blocked,
    Done,
}

impl Status {
    /// Board column order.
    pub const ALL: [Status; 5] = [
        Status::Todo,
        Status::Ready,
        Status::InProgress,
        Status::Done,
        Status::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Ready => "ready",
            Self::InProgress => "in-progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Work can still be picked up: neither finished nor blocked.
    pub fn is_actionable(&self) -> bool {
        !self.is_terminal() && *self != Self::Blocked
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "ready" => Ok(Self::Ready),
            "in-progress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quest {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub is_ready: bool,
    pub priority: Priority,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub quest_id: i64,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub is_ready: bool,
    pub sort_order: i64,
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A quest as listed on the board: its columns flattened plus its tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestWithTasks {
    #[serde(flatten)]
    pub quest: Quest,
    pub tasks: Vec<Task>,
}

impl QuestWithTasks {
    /// `(done, total)` task counts.
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .tasks
            .iter()
            .filter(|t| t.status == Status::Done)
            .count();
        (done, self.tasks.len())
    }

    /// First task (by sort order) that is gated ready and still actionable.
    pub fn next_ready_task(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.is_ready && t.status.is_actionable())
            .min_by_key(|t| (t.sort_order, t.id))
    }
}

// ── Request payloads ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewQuest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub is_ready: Option<bool>,
    pub priority: Option<Priority>,
    pub sort_order: Option<i64>,
}

impl QuestPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.is_ready.is_none()
            && self.priority.is_none()
            && self.sort_order.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub is_ready: Option<bool>,
    pub sort_order: Option<i64>,
    pub result: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.is_ready.is_none()
            && self.sort_order.is_none()
            && self.result.is_none()
    }
}

// ── API view types ────────────────────────────────────────────────────

/// Column counts shown in the board header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardSummary {
    pub counts: BTreeMap<String, usize>,
    pub ready: usize,
    pub total: usize,
    /// Done tasks across every quest.
    pub tasks_done: usize,
    pub tasks_total: usize,
    /// What a step would pick up next, when anything is gated ready.
    pub next_task: Option<NextTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextTask {
    pub quest_id: i64,
    pub task_id: i64,
    pub title: String,
}

impl BoardSummary {
    pub fn from_quests(quests: &[QuestWithTasks]) -> Self {
        let mut counts: BTreeMap<String, usize> = Status::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for q in quests {
            *counts.entry(q.quest.status.as_str().to_string()).or_insert(0) += 1;
        }
        let (tasks_done, tasks_total) = quests
            .iter()
            .map(QuestWithTasks::progress)
            .fold((0, 0), |(d, t), (done, total)| (d + done, t + total));
        // Quests arrive in board order; the first ready one wins.
        let next_task = quests
            .iter()
            .filter(|q| q.quest.is_ready && q.quest.status.is_actionable())
            .find_map(|q| {
                q.next_ready_task().map(|t| NextTask {
                    quest_id: q.quest.id,
                    task_id: t.id,
                    title: t.title.clone(),
                })
            });
        Self {
            counts,
            ready: quests.iter().filter(|q| q.quest.is_ready).count(),
            total: quests.len(),
            tasks_done,
            tasks_total,
            next_task,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let parsed: Status = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(parsed, Status::Blocked);
    }

    #[test]
    fn test_status_from_str_matches_as_str() {
        for status in Status::ALL {
            assert_eq!(Status::from_str(status.as_str()).unwrap(), status);
        }
        assert!(Status::from_str("in_progress").is_err());
    }

    #[test]
    fn test_priority_default_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert!(Priority::from_str("critical").is_err());
    }

    #[test]
    fn test_only_done_is_terminal() {
        assert!(Status::Done.is_terminal());
        assert!(!Status::Blocked.is_terminal());
        assert!(!Status::InProgress.is_terminal());
    }

    #[test]
    fn test_actionable_excludes_done_and_blocked() {
        let actionable: Vec<Status> = Status::ALL
            .into_iter()
            .filter(Status::is_actionable)
            .collect();
        assert_eq!(actionable, vec![Status::Todo, Status::Ready, Status::InProgress]);
    }

    #[test]
    fn test_all_is_board_column_order() {
        let names: Vec<&str> = Status::ALL.iter().map(Status::as_str).collect();
        assert_eq!(names, vec!["todo", "ready", "in-progress", "done", "blocked"]);
    }

    #[test]
    fn test_quest_with_tasks_flattens_quest_fields() {
        let qwt = QuestWithTasks {
            quest: quest(7, Status::Ready, true),
            tasks: vec![task(1, 0, Status::Todo, false)],
        };
        let value = serde_json::to_value(&qwt).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["status"], "ready");
        assert_eq!(value["is_ready"], true);
        assert_eq!(value["tasks"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_progress_counts_done_tasks() {
        let qwt = QuestWithTasks {
            quest: quest(1, Status::InProgress, true),
            tasks: vec![
                task(1, 0, Status::Done, true),
                task(2, 1, Status::InProgress, true),
                task(3, 2, Status::Done, false),
            ],
        };
        assert_eq!(qwt.progress(), (2, 3));
    }

    #[test]
    fn test_next_ready_task_skips_unready_done_and_blocked() {
        let qwt = QuestWithTasks {
            quest: quest(1, Status::InProgress, true),
            tasks: vec![
                task(1, 0, Status::Done, true),
                task(2, 1, Status::Todo, false),
                task(3, 2, Status::Blocked, true),
                task(4, 5, Status::Todo, true),
                task(5, 3, Status::Ready, true),
            ],
        };
        assert_eq!(qwt.next_ready_task().map(|t| t.id), Some(5));
    }

    #[test]
    fn test_next_ready_task_none_when_nothing_gated() {
        let qwt = QuestWithTasks {
            quest: quest(1, Status::Todo, false),
            tasks: vec![task(1, 0, Status::Todo, false)],
        };
        assert!(qwt.next_ready_task().is_none());
    }

    #[test]
    fn test_board_summary_counts_every_status() {
        let quests = vec![
            QuestWithTasks { quest: quest(1, Status::Todo, false), tasks: vec![] },
            QuestWithTasks { quest: quest(2, Status::Todo, true), tasks: vec![] },
            QuestWithTasks { quest: quest(3, Status::Done, false), tasks: vec![] },
        ];
        let summary = BoardSummary::from_quests(&quests);
        assert_eq!(summary.counts["todo"], 2);
        assert_eq!(summary.counts["done"], 1);
        assert_eq!(summary.counts["in-progress"], 0);
        assert_eq!(summary.counts["blocked"], 0);
        assert_eq!(summary.counts.len(), 5);
        assert_eq!(summary.ready, 1);
        assert_eq!(summary.total, 3);
        assert_eq!((summary.tasks_done, summary.tasks_total), (0, 0));
        assert!(summary.next_task.is_none());
    }

    #[test]
    fn test_board_summary_progress_and_next_task() {
        let mut later = quest(2, Status::InProgress, true);
        later.sort_order = 1;
        let mut blocked_tasks = vec![task(20, 0, Status::Todo, true)];
        blocked_tasks[0].quest_id = 3;
        let quests = vec![
            QuestWithTasks {
                quest: quest(1, Status::Todo, false),
                tasks: vec![task(10, 0, Status::Ready, true)],
            },
            QuestWithTasks {
                quest: quest(3, Status::Blocked, true),
                tasks: blocked_tasks,
            },
            QuestWithTasks {
                quest: later,
                tasks: vec![
                    task(30, 0, Status::Done, true),
                    task(31, 1, Status::Todo, true),
                ],
            },
        ];
        let summary = BoardSummary::from_quests(&quests);
        assert_eq!((summary.tasks_done, summary.tasks_total), (1, 4));
        assert_eq!(
            summary.next_task,
            Some(NextTask {
                quest_id: 2,
                task_id: 31,
                title: "Task 31".into(),
            })
        );
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(QuestPatch::default().is_empty());
        let patch: QuestPatch = serde_json::from_str(r#"{"is_ready": true}"#).unwrap();
        assert!(!patch.is_empty());
        assert!(TaskPatch::default().is_empty());
        let patch: TaskPatch = serde_json::from_str(r#"{"result": "ok"}"#).unwrap();
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_new_quest_defaults() {
        let new: NewQuest = serde_json::from_str(r#"{"title": "Ship it"}"#).unwrap();
        assert_eq!(new.title, "Ship it");
        assert_eq!(new.description, "");
        assert_eq!(new.priority, Priority::Medium);
        assert_eq!(new.sort_order, 0);
    }
}
