// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Task list filtering.
//!
//! Every supplied criterion adds one `AND` clause; an absent criterion adds
//! nothing. The result is always ordered by creation time, then id.
use anyhow::{Context, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use task_manager_common::{TaskDetail, TaskFilter};
use tracing::debug;

use crate::database::tasks::{TASK_DETAIL_SELECT, attach_labels};

/// Tasks matching every criterion of `filter`.
///
/// `actor` is the authenticated user; `self_tasks` restricts the list to
/// tasks they authored and is ignored when there is no actor.
pub async fn filter_tasks(
    pool: &SqlitePool,
    filter: &TaskFilter,
    actor: Option<i64>,
) -> Result<Vec<TaskDetail>> {
    let mut query = QueryBuilder::<Sqlite>::new(TASK_DETAIL_SELECT);
    push_criteria(&mut query, filter, actor);
    query.push(" ORDER BY t.created_at ASC, t.id ASC");

    debug!("Task list query: {}", query.sql());

    let mut tasks = query
        .build_query_as::<TaskDetail>()
        .fetch_all(pool)
        .await
        .context("Failed to retrieve filtered tasks from DB")?;

    attach_labels(pool, &mut tasks).await?;
    Ok(tasks)
}

fn push_criteria(query: &mut QueryBuilder<'_, Sqlite>, filter: &TaskFilter, actor: Option<i64>) {
    query.push(" WHERE 1 = 1");

    if let Some(status_id) = filter.status {
        query.push(" AND t.status_id = ").push_bind(status_id);
    }
    // A task without executor has NULL here and never equals an id.
    if let Some(executor_id) = filter.executor {
        query.push(" AND t.executor_id = ").push_bind(executor_id);
    }
    // Membership, not equality: tasks carrying other labels as well match.
    if let Some(label_id) = filter.labels {
        query
            .push(" AND EXISTS (SELECT 1 FROM task_labels tl WHERE tl.task_id = t.id AND tl.label_id = ")
            .push_bind(label_id)
            .push(")");
    }
    if let (true, Some(author_id)) = (filter.self_tasks, actor) {
        query.push(" AND t.author_id = ").push_bind(author_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tasks::{TaskFields, insert_task};
    use crate::database::{catalog, connect_in_memory, users};
    use task_manager_common::{Label, Status};

    struct Board {
        pool: SqlitePool,
        alice: i64,
        bob: i64,
        new: i64,
        in_progress: i64,
        bug: i64,
        feature: i64,
        t1: i64,
        t2: i64,
        t3: i64,
    }

    /// T1: New, {Bug}, by alice, executor bob
    /// T2: In progress, {Feature}, by bob, executor alice
    /// T3: New, {Bug, Feature}, by bob, no executor
    async fn board() -> Board {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let user = |name: &str| users::UserFields {
            username: name.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            password_hash: "x".to_string(),
        };
        let alice = users::insert_user(&mut conn, user("alice")).await.unwrap().id;
        let bob = users::insert_user(&mut conn, user("bob")).await.unwrap().id;
        let new = catalog::insert::<Status>(&mut conn, "New").await.unwrap().id;
        let in_progress = catalog::insert::<Status>(&mut conn, "In progress").await.unwrap().id;
        let bug = catalog::insert::<Label>(&mut conn, "Bug").await.unwrap().id;
        let feature = catalog::insert::<Label>(&mut conn, "Feature").await.unwrap().id;

        let task = |name: &str, status_id, executor_id, label_ids: Vec<i64>| TaskFields {
            name: name.to_string(),
            description: String::new(),
            status_id,
            executor_id,
            label_ids,
        };
        let t1 = insert_task(&mut conn, task("T1", new, Some(bob), vec![bug]), alice)
            .await
            .unwrap()
            .id;
        let t2 = insert_task(&mut conn, task("T2", in_progress, Some(alice), vec![feature]), bob)
            .await
            .unwrap()
            .id;
        let t3 = insert_task(&mut conn, task("T3", new, None, vec![bug, feature]), bob)
            .await
            .unwrap()
            .id;
        drop(conn);

        Board { pool, alice, bob, new, in_progress, bug, feature, t1, t2, t3 }
    }

    async fn ids(board: &Board, filter: TaskFilter, actor: Option<i64>) -> Vec<i64> {
        filter_tasks(&board.pool, &filter, actor)
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.id)
            .collect()
    }

    #[tokio::test]
    async fn test_no_criteria_returns_all_in_creation_order() {
        let b = board().await;
        assert_eq!(ids(&b, TaskFilter::default(), None).await, vec![b.t1, b.t2, b.t3]);
    }

    #[tokio::test]
    async fn test_single_criteria() {
        let b = board().await;
        let status = TaskFilter { status: Some(b.new), ..TaskFilter::default() };
        assert_eq!(ids(&b, status, None).await, vec![b.t1, b.t3]);

        let label = TaskFilter { labels: Some(b.bug), ..TaskFilter::default() };
        assert_eq!(ids(&b, label, None).await, vec![b.t1, b.t3]);

        let label = TaskFilter { labels: Some(b.feature), ..TaskFilter::default() };
        assert_eq!(ids(&b, label, None).await, vec![b.t2, b.t3]);

        let executor = TaskFilter { executor: Some(b.alice), ..TaskFilter::default() };
        assert_eq!(ids(&b, executor, None).await, vec![b.t2]);

        let mine = TaskFilter { self_tasks: true, ..TaskFilter::default() };
        assert_eq!(ids(&b, mine, Some(b.bob)).await, vec![b.t2, b.t3]);
    }

    #[tokio::test]
    async fn test_status_and_label_combined() {
        let b = board().await;
        let filter = TaskFilter { status: Some(b.new), labels: Some(b.bug), ..TaskFilter::default() };
        assert_eq!(ids(&b, filter, None).await, vec![b.t1, b.t3]);
    }

    #[tokio::test]
    async fn test_combined_result_is_intersection_of_single_results() {
        let b = board().await;
        let statuses = [None, Some(b.new), Some(b.in_progress)];
        let executors = [None, Some(b.alice), Some(b.bob)];
        let labels = [None, Some(b.bug), Some(b.feature)];

        for status in statuses {
            for executor in executors {
                for label in labels {
                    for self_tasks in [false, true] {
                        let combined = TaskFilter { status, executor, labels: label, self_tasks };
                        let got = ids(&b, combined.clone(), Some(b.bob)).await;

                        let singles = [
                            TaskFilter { status, ..TaskFilter::default() },
                            TaskFilter { executor, ..TaskFilter::default() },
                            TaskFilter { labels: label, ..TaskFilter::default() },
                            TaskFilter { self_tasks, ..TaskFilter::default() },
                        ];
                        let mut expected = vec![b.t1, b.t2, b.t3];
                        for single in singles {
                            let matched = ids(&b, single, Some(b.bob)).await;
                            expected.retain(|id| matched.contains(id));
                        }
                        assert_eq!(got, expected, "filter {combined:?}");
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_identifiers_match_nothing() {
        let b = board().await;
        for filter in [
            TaskFilter { status: Some(999), ..TaskFilter::default() },
            TaskFilter { executor: Some(999), ..TaskFilter::default() },
            TaskFilter { labels: Some(999), ..TaskFilter::default() },
        ] {
            assert!(ids(&b, filter, None).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_self_tasks_without_actor_is_ignored() {
        let b = board().await;
        let mine = TaskFilter { self_tasks: true, ..TaskFilter::default() };
        assert_eq!(ids(&b, mine, None).await, vec![b.t1, b.t2, b.t3]);
    }

    #[tokio::test]
    async fn test_self_tasks_and_other_executor_are_independent() {
        let b = board().await;
        // Alice's own tasks that bob executes: T1.
        let filter = TaskFilter { executor: Some(b.bob), self_tasks: true, ..TaskFilter::default() };
        assert_eq!(ids(&b, filter.clone(), Some(b.alice)).await, vec![b.t1]);
        // Bob's own tasks that bob executes: none.
        assert!(ids(&b, filter, Some(b.bob)).await.is_empty());
    }

    #[tokio::test]
    async fn test_filtered_tasks_carry_labels() {
        let b = board().await;
        let filter = TaskFilter { labels: Some(b.bug), ..TaskFilter::default() };
        let tasks = filter_tasks(&b.pool, &filter, None).await.unwrap();
        let t3 = tasks.iter().find(|task| task.id == b.t3).unwrap();
        let names: Vec<&str> = t3.labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Bug", "Feature"]);
    }
}
