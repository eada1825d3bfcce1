//! Concurrent load generator.
//!
//! Registers and logs in a fixed roster of accounts, then fires randomized
//! create/update/delete/read bursts against a running instance. Several
//! actions run concurrently per wave, so the same accounts race each other
//! on registration, and readers race deleters on a shrinking record set.

use anyhow::Result;
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

const ROSTER: &[(&str, &str)] = &[
    ("admin", "admin123"),
    ("user1", "password123"),
    ("user2", "password456"),
    ("developer", "dev123"),
    ("manager", "mgr789"),
];

const RECORD_TYPES: &[&str] = &["user", "product", "order", "report", "config"];

#[derive(Debug, Clone, Copy)]
enum Action {
    Create,
    Update,
    Delete,
    Read,
}

const ACTIONS: &[Action] = &[Action::Create, Action::Update, Action::Delete, Action::Read];

struct Simulator {
    base_url: String,
    client: reqwest::Client,
    tokens: Mutex<HashMap<String, String>>,
}

pub async fn run(base_url: String) -> Result<()> {
    info!("Starting user activity simulator against {base_url}");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let sim = Arc::new(Simulator {
        base_url,
        client,
        tokens: Mutex::new(HashMap::new()),
    });

    // Registration wave: admin is seeded by the service, the rest race here
    sim.register_roster().await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    for (username, password) in ROSTER {
        sim.login(username, password).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    info!("Simulator ready, starting activity waves");

    loop {
        let num_actions = {
            let mut rng = rand::rng();
            rng.random_range(1..=5)
        };

        let mut tasks = Vec::with_capacity(num_actions);
        for _ in 0..num_actions {
            let sim = Arc::clone(&sim);
            tasks.push(tokio::spawn(async move {
                sim.simulate_user_activity().await;
            }));
        }

        for task in tasks {
            task.await.ok();
        }

        let delay = {
            let mut rng = rand::rng();
            rng.random_range(1..=4)
        };
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }
}

impl Simulator {
    async fn register_roster(&self) {
        for (username, password) in &ROSTER[1..] {
            let body = json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": password,
            });

            let result = self
                .client
                .post(format!("{}/register", self.base_url))
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    info!("Registered user {username}");
                }
                Ok(resp) if resp.status().as_u16() == 409 => {
                    info!("User {username} already exists");
                }
                Ok(resp) => warn!("Registration of {username} failed: {}", resp.status()),
                Err(e) => warn!("Registration of {username} failed: {e}"),
            }
        }
    }

    async fn login(&self, username: &str, password: &str) -> bool {
        let body = json!({ "username": username, "password": password });

        let result = self
            .client
            .post(format!("{}/login", self.base_url))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                let Ok(json) = resp.json::<serde_json::Value>().await else {
                    return false;
                };
                let Some(token) = json["data"]["access_token"].as_str() else {
                    return false;
                };
                self.tokens
                    .lock()
                    .await
                    .insert(username.to_string(), token.to_string());
                info!("User {username} logged in");
                true
            }
            Ok(resp) => {
                warn!("Login failed for {username}: {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Login failed for {username}: {e}");
                false
            }
        }
    }

    async fn simulate_user_activity(&self) {
        let (user_idx, action) = {
            let mut rng = rand::rng();
            (
                rng.random_range(0..ROSTER.len()),
                ACTIONS[rng.random_range(0..ACTIONS.len())],
            )
        };

        let (username, password) = ROSTER[user_idx];

        let has_token = self.tokens.lock().await.contains_key(username);
        if !has_token && !self.login(username, password).await {
            return;
        }

        self.perform_action(username, action).await;
    }

    async fn perform_action(&self, username: &str, action: Action) {
        let Some(token) = self.tokens.lock().await.get(username).cloned() else {
            return;
        };

        match action {
            Action::Create => self.create_record(username, &token).await,
            Action::Update => self.update_record(username, &token).await,
            Action::Delete => self.delete_record(username, &token).await,
            Action::Read => self.read_records(username, &token).await,
        }
    }

    async fn create_record(&self, username: &str, token: &str) {
        let (record_type, number) = {
            let mut rng = rand::rng();
            (
                RECORD_TYPES[rng.random_range(0..RECORD_TYPES.len())],
                rng.random_range(1000..=9999),
            )
        };

        let body = json!({
            "record_type": record_type,
            "title": format!("{record_type} #{number}"),
            "description": format!("Generated {record_type} record by {username}"),
        });

        let result = self
            .client
            .post(format!("{}/actions/create_record", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await;

        if let Ok(resp) = result {
            if resp.status().is_success() {
                info!("{username} created a {record_type} record");
            }
        }
    }

    async fn update_record(&self, username: &str, token: &str) {
        let Some(record_id) = self.pick_record_id(token, 5).await else {
            return;
        };

        let body = json!({
            "record_id": record_id,
            "title": format!("Updated record {record_id}"),
            "description": format!("Updated by {username}"),
        });

        let result = self
            .client
            .post(format!("{}/actions/update_record", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await;

        if let Ok(resp) = result {
            if resp.status().is_success() {
                info!("{username} updated record {record_id}");
            }
        }
    }

    async fn delete_record(&self, username: &str, token: &str) {
        let Some(record_id) = self.pick_record_id(token, 3).await else {
            return;
        };

        let result = self
            .client
            .delete(format!(
                "{}/actions/delete_record?record_id={record_id}",
                self.base_url
            ))
            .bearer_auth(token)
            .send()
            .await;

        match result {
            // 404 is expected when a concurrent delete got there first
            Ok(resp) if resp.status().is_success() => {
                info!("{username} deleted record {record_id}");
            }
            _ => {}
        }
    }

    async fn read_records(&self, username: &str, token: &str) {
        let (record_type, limit) = {
            let mut rng = rand::rng();
            let record_type = if rng.random_bool(0.5) {
                Some(RECORD_TYPES[rng.random_range(0..RECORD_TYPES.len())])
            } else {
                None
            };
            (record_type, rng.random_range(5..=15))
        };

        let mut url = format!("{}/actions/read_records?limit={limit}", self.base_url);
        if let Some(record_type) = record_type {
            url.push_str(&format!("&record_type={record_type}"));
        }

        let result = self.client.get(url).bearer_auth(token).send().await;

        if let Ok(resp) = result {
            if resp.status().is_success() {
                if let Ok(json) = resp.json::<serde_json::Value>().await {
                    let count = json["data"]["count"].as_u64().unwrap_or(0);
                    info!("{username} read {count} records");
                }
            }
        }
    }

    /// Grab a random id from the current active set (racy on purpose).
    async fn pick_record_id(&self, token: &str, limit: u64) -> Option<i64> {
        let resp = self
            .client
            .get(format!(
                "{}/actions/read_records?limit={limit}",
                self.base_url
            ))
            .bearer_auth(token)
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            return None;
        }

        let json = resp.json::<serde_json::Value>().await.ok()?;
        let records = json["data"]["records"].as_array()?;
        if records.is_empty() {
            return None;
        }

        let idx = {
            let mut rng = rand::rng();
            rng.random_range(0..records.len())
        };

        records[idx]["id"].as_i64()
    }
}
