use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const TEST_USER: &str = "00000000-0000-4000-8000-000000000001";
pub const TEST_KEY: &str = "00000000-0000-4000-8000-00000000beef";

/// apiDoc text describing exactly the routes this server implements.
pub const APIDOC: &str = "\
@api {get} /api/v3/status Get the API status
@apiSuccess {Object} data Status object
@api {get} /api/v3/user Get the authenticated user's profile
@apiSuccess {Object} data The user object
@api {get} /api/v3/tasks/user Get a user's tasks
@apiParam (Query) {String=\"habits\",\"dailys\",\"todos\",\"completedTodos\"} [type] Task type filter
@apiSuccess {Array} data An array of tasks
@api {post} /api/v3/tasks/user Create a new task belonging to the user
@apiParam (Body) {String} text The text to be displayed for the task
@apiParam (Body) {String=\"habit\",\"daily\",\"todo\"} type Task type
@apiSuccess (201) {Object} data The created task
@api {get} /api/v3/tasks/:taskId Get a task
@apiParam (Path) {String} taskId The task _id or alias
@apiSuccess {Object} data The task object
@api {delete} /api/v3/tasks/:taskId Delete a task given its id
@apiParam (Path) {String} taskId The task _id or alias
@apiSuccess {Object} data An empty object
@api {post} /api/v3/tasks/:taskId/score/:direction Score a task
@apiParam (Path) {String} taskId The task _id or alias
@apiParam (Path) {String=\"up\",\"down\"} direction The direction for scoring the task
@apiSuccess {Object} data The user stats
";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Habit,
    Daily,
    Todo,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub value: f64,
    pub completed: bool,
    pub is_due: bool,
    pub up: bool,
    pub down: bool,
}

impl Task {
    pub fn new(kind: TaskType, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            text: text.to_string(),
            alias: None,
            value: 0.0,
            completed: false,
            is_due: true,
            up: true,
            down: kind == TaskType::Habit,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stats {
    pub hp: f64,
    #[serde(rename = "maxHealth")]
    pub max_health: f64,
    pub exp: f64,
    #[serde(rename = "toNextLevel")]
    pub to_next_level: f64,
    pub mp: f64,
    #[serde(rename = "maxMP")]
    pub max_mp: f64,
    pub gp: f64,
    pub lvl: u32,
    pub class: String,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            hp: 50.0,
            max_health: 50.0,
            exp: 0.0,
            to_next_level: 25.0,
            mp: 10.0,
            max_mp: 10.0,
            gp: 0.0,
            lvl: 1,
            class: "warrior".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Account {
    pub stats: Stats,
    pub tasks: Vec<Task>,
}

impl Account {
    /// One habit, one daily and two todos.
    pub fn seeded() -> Self {
        let mut workout = Task::new(TaskType::Todo, "Buy running shoes");
        workout.alias = Some("shoes".to_string());
        Self {
            stats: Stats::default(),
            tasks: vec![
                Task::new(TaskType::Habit, "Drink water"),
                Task::new(TaskType::Daily, "Stretch"),
                Task::new(TaskType::Todo, "File taxes"),
                workout,
            ],
        }
    }

    fn find(&self, id_or_alias: &str) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.id.to_string() == id_or_alias || t.alias.as_deref() == Some(id_or_alias))
    }
}

pub type Db = Arc<RwLock<Account>>;

/// Error body in the service's envelope format.
pub struct Failure {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    fn task_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NotFound", "Task not found.")
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let body = json!({"success": false, "error": self.error, "message": self.message});
        (self.status, Json(body)).into_response()
    }
}

fn envelope(data: impl Serialize) -> Json<Value> {
    Json(json!({"success": true, "data": data}))
}

pub fn app() -> Router {
    app_with(Account::seeded())
}

pub fn app_with(account: Account) -> Router {
    let db: Db = Arc::new(RwLock::new(account));
    let authenticated = Router::new()
        .route("/api/v3/user", get(get_user))
        .route("/api/v3/tasks/user", get(list_tasks).post(create_task))
        .route("/api/v3/tasks/{id}", get(get_task).delete(delete_task))
        .route("/api/v3/tasks/{id}/score/{direction}", post(score_task))
        .layer(middleware::from_fn(require_auth));
    Router::new()
        .route("/api/v3/status", get(status))
        .route("/apidoc.txt", get(apidoc))
        .merge(authenticated)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_auth(request: Request, next: Next) -> Result<Response, Failure> {
    let (user, key) = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        (header("x-api-user"), header("x-api-key"))
    };
    match (user, key) {
        (Some(user), Some(key)) if user == TEST_USER && key == TEST_KEY => Ok(next.run(request).await),
        (None, _) | (_, None) => Err(Failure::new(
            StatusCode::UNAUTHORIZED,
            "NotAuthorized",
            "Missing authentication headers.",
        )),
        _ => Err(Failure::new(
            StatusCode::UNAUTHORIZED,
            "NotAuthorized",
            "There is no account that uses those credentials.",
        )),
    }
}

async fn status() -> Json<Value> {
    envelope(json!({"status": "up"}))
}

async fn apidoc() -> &'static str {
    APIDOC
}

async fn get_user(State(db): State<Db>) -> Json<Value> {
    let account = db.read().await;
    envelope(json!({"id": TEST_USER, "profile": {"name": "tester"}, "stats": account.stats}))
}

#[derive(Deserialize)]
pub struct TaskFilter {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

async fn list_tasks(
    State(db): State<Db>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Value>, Failure> {
    let account = db.read().await;
    let keep: Box<dyn Fn(&Task) -> bool> = match filter.kind.as_deref() {
        None => Box::new(|_| true),
        Some("habits") => Box::new(|t| t.kind == TaskType::Habit),
        Some("dailys") => Box::new(|t| t.kind == TaskType::Daily),
        Some("todos") => Box::new(|t| t.kind == TaskType::Todo && !t.completed),
        Some("completedTodos") => Box::new(|t| t.kind == TaskType::Todo && t.completed),
        Some(other) => {
            return Err(Failure::new(
                StatusCode::BAD_REQUEST,
                "BadRequest",
                format!("Invalid task type `{other}`."),
            ))
        }
    };
    let tasks: Vec<&Task> = account.tasks.iter().filter(|t| keep(t)).collect();
    Ok(envelope(tasks))
}

#[derive(Deserialize)]
pub struct CreateTask {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub alias: Option<String>,
}

async fn create_task(
    State(db): State<Db>,
    Json(input): Json<CreateTask>,
) -> (StatusCode, Json<Value>) {
    let mut task = Task::new(input.kind, &input.text);
    task.alias = input.alias;
    let data = envelope(&task);
    db.write().await.tasks.push(task);
    (StatusCode::CREATED, data)
}

async fn get_task(State(db): State<Db>, Path(id): Path<String>) -> Result<Json<Value>, Failure> {
    let account = db.read().await;
    let idx = account.find(&id).ok_or_else(Failure::task_not_found)?;
    Ok(envelope(&account.tasks[idx]))
}

async fn delete_task(State(db): State<Db>, Path(id): Path<String>) -> Result<Json<Value>, Failure> {
    let mut account = db.write().await;
    let idx = account.find(&id).ok_or_else(Failure::task_not_found)?;
    account.tasks.remove(idx);
    Ok(envelope(json!({})))
}

async fn score_task(
    State(db): State<Db>,
    Path((id, direction)): Path<(String, String)>,
) -> Result<Json<Value>, Failure> {
    let delta = match direction.as_str() {
        "up" => 1.0,
        "down" => -1.0,
        _ => {
            return Err(Failure::new(
                StatusCode::BAD_REQUEST,
                "BadRequest",
                "Invalid direction, must be 'up' or 'down'.",
            ))
        }
    };
    let mut account = db.write().await;
    let idx = account.find(&id).ok_or_else(Failure::task_not_found)?;

    let task = &mut account.tasks[idx];
    task.value += delta;
    if task.kind != TaskType::Habit {
        task.completed = delta > 0.0;
    }
    let stats = &mut account.stats;
    if delta > 0.0 {
        stats.exp += 10.0;
        stats.gp += 1.0;
    } else {
        stats.hp -= 1.0;
    }
    Ok(envelope(json!({
        "delta": delta,
        "hp": stats.hp,
        "exp": stats.exp,
        "gp": stats.gp,
        "lvl": stats.lvl,
    })))
}
