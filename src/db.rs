// src/db.rs

use std::{collections::HashMap, time::Duration};

use sqlx::{PgConnection, PgPool, postgres::PgPoolOptions};

use crate::{
    config::Config,
    error::AppError,
    models::question::{Choice, PublicQuestion, Question},
    utils::{hash::hash_password, jwt::ROLE_ADMIN},
};

const CONNECT_RETRIES: u32 = 5;

/// Opens the connection pool, retrying while the database comes up.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > CONNECT_RETRIES {
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Creates the configured admin account if it does not exist yet.
pub async fn seed_admin_user(pool: &PgPool, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if exists.is_none() {
        tracing::info!("Seeding admin user: {}", username);
        let hashed_password = hash_password(password)?;

        sqlx::query("INSERT INTO users (username, password, role) VALUES ($1, $2, $3) ON CONFLICT (username) DO NOTHING")
            .bind(username)
            .bind(hashed_password)
            .bind(ROLE_ADMIN)
            .execute(pool)
            .await?;
        tracing::info!("Admin user created successfully.");
    }
    Ok(())
}

pub const QUESTION_COLUMNS: &str =
    "q.id, q.topic_id, q.title, q.prompt, q.is_multiple_answer, q.answer, q.created_at";

pub async fn fetch_question(conn: &mut PgConnection, id: i64) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {} FROM questions q WHERE q.id = $1", QUESTION_COLUMNS))
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Choices of the given questions, grouped by question and in display order.
pub async fn fetch_choices(
    conn: &mut PgConnection,
    question_ids: &[i64],
) -> Result<HashMap<i64, Vec<Choice>>, sqlx::Error> {
    let choices = sqlx::query_as::<_, Choice>(
        r#"
        SELECT id, question_id, text, position
        FROM choices
        WHERE question_id = ANY($1)
        ORDER BY question_id, position, id
        "#,
    )
    .bind(question_ids)
    .fetch_all(conn)
    .await?;

    let mut grouped: HashMap<i64, Vec<Choice>> = HashMap::new();
    for choice in choices {
        grouped.entry(choice.question_id).or_default().push(choice);
    }
    Ok(grouped)
}

/// The questions of a test instance, in the order fixed at creation.
pub async fn fetch_instance_questions(
    conn: &mut PgConnection,
    instance_id: i64,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        r#"
        SELECT {}
        FROM test_instance_questions tiq
        JOIN questions q ON q.id = tiq.question_id
        WHERE tiq.instance_id = $1
        ORDER BY tiq.position
        "#,
        QUESTION_COLUMNS
    ))
    .bind(instance_id)
    .fetch_all(conn)
    .await
}

/// Learner-facing projection of the given questions, answers stripped.
pub async fn public_questions(
    conn: &mut PgConnection,
    questions: &[Question],
) -> Result<Vec<PublicQuestion>, sqlx::Error> {
    let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let choices = fetch_choices(conn, &ids).await?;

    Ok(questions
        .iter()
        .map(|q| {
            let own = choices.get(&q.id).map(Vec::as_slice).unwrap_or(&[]);
            PublicQuestion::from_parts(q, own)
        })
        .collect())
}
