use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::core::{
    ContributionBreakdown, ContributionScheme, DEFAULT_CONTRIBUTOR_AGE, DEFAULT_WAGE_CEILING,
    ExpenseInstrument, IncomeInstrument, MonthBreakdown, ProjectionPoint, ProjectionSettings,
    ProjectionSummary, SchemeError, SubAccount, YearMonth, month_breakdown, round2,
    run_projection, summarize,
};

const MAX_HORIZON_MONTHS: u32 = 1200;
const MAX_CONTRIBUTOR_AGE: u32 = 150;

#[derive(Parser, Debug)]
#[command(
    name = "fincast",
    about = "Monthly cash-flow and balance projection with contribution-aware income"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the projection API over HTTP
    Serve(ServeArgs),
    /// Project a JSON file of incomes and expenses and print the result
    Project(ProjectArgs),
    /// Preview contributions and take-home pay for a gross monthly amount
    Contribution(ContributionArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EngineDefaults {
    #[arg(
        long,
        default_value_t = DEFAULT_WAGE_CEILING,
        help = "Monthly wage ceiling for contributions"
    )]
    pub wage_ceiling: Decimal,
    #[arg(long, default_value_t = 12, help = "Months to project when not requested")]
    pub horizon_months: u32,
    #[arg(long, help = "Contributor age; defaults to a mid-career employee")]
    pub age: Option<u32>,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            wage_ceiling: DEFAULT_WAGE_CEILING,
            horizon_months: 12,
            age: None,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[command(flatten)]
    pub defaults: EngineDefaults,
}

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[arg(long, help = "JSON file shaped like the /api/project request body")]
    pub input: PathBuf,
    #[arg(long, allow_hyphen_values = true, help = "Overrides startingBalance from the file")]
    pub starting_balance: Option<Decimal>,
    #[arg(long, help = "First projected month as YYYY-MM-DD; defaults to today")]
    pub as_of: Option<NaiveDate>,
    #[command(flatten)]
    pub defaults: EngineDefaults,
}

#[derive(Args, Debug)]
pub struct ContributionArgs {
    #[arg(long)]
    pub gross: Decimal,
    #[command(flatten)]
    pub defaults: EngineDefaults,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("invalid contribution scheme: {0}")]
    Scheme(#[from] SchemeError),
    #[error("failed to read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::ReadInput { .. } | ApiError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.status(), &self.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectPayload {
    incomes: Vec<IncomeInstrument>,
    expenses: Vec<ExpenseInstrument>,
    horizon_months: Option<u32>,
    starting_balance: Option<Decimal>,
    contributor_age: Option<u32>,
    as_of: Option<NaiveDate>,
    wage_ceiling: Option<Decimal>,
    breakdown_month: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContributionPayload {
    gross_amount: Option<Decimal>,
    age: Option<u32>,
    wage_ceiling: Option<Decimal>,
}

#[derive(Debug)]
struct ProjectRequest {
    incomes: Vec<IncomeInstrument>,
    expenses: Vec<ExpenseInstrument>,
    settings: ProjectionSettings,
    breakdown_month: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    anchor_month: YearMonth,
    horizon_months: u32,
    starting_balance: Decimal,
    points: Vec<ProjectionPoint>,
    summary: ProjectionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    breakdown: Option<MonthBreakdown>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionResponse {
    contributor_age: u32,
    wage_ceiling: Decimal,
    #[serde(flatten)]
    contribution: ContributionBreakdown,
    sub_accounts: BTreeMap<SubAccount, Decimal>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn validate_age(age: Option<u32>) -> Result<Option<u32>, ApiError> {
    match age {
        Some(age) if age > MAX_CONTRIBUTOR_AGE => Err(ApiError::InvalidRequest(format!(
            "age must be <= {MAX_CONTRIBUTOR_AGE}"
        ))),
        other => Ok(other),
    }
}

fn build_scheme(wage_ceiling: Decimal) -> Result<ContributionScheme, ApiError> {
    let scheme = ContributionScheme::default().with_wage_ceiling(wage_ceiling);
    scheme.validate()?;
    Ok(scheme)
}

fn build_project_request(
    payload: ProjectPayload,
    defaults: &EngineDefaults,
    today: NaiveDate,
) -> Result<ProjectRequest, ApiError> {
    let horizon_months = payload.horizon_months.unwrap_or(defaults.horizon_months);
    if !(1..=MAX_HORIZON_MONTHS).contains(&horizon_months) {
        return Err(ApiError::InvalidRequest(format!(
            "horizonMonths must be between 1 and {MAX_HORIZON_MONTHS}"
        )));
    }

    if let Some(month) = payload.breakdown_month {
        if month >= horizon_months {
            return Err(ApiError::InvalidRequest(
                "breakdownMonth must be < horizonMonths".to_string(),
            ));
        }
    }

    let contributor_age = validate_age(payload.contributor_age.or(defaults.age))?;
    let scheme = build_scheme(payload.wage_ceiling.unwrap_or(defaults.wage_ceiling))?;
    let anchor = YearMonth::from_date(payload.as_of.unwrap_or(today));

    Ok(ProjectRequest {
        incomes: payload.incomes,
        expenses: payload.expenses,
        settings: ProjectionSettings {
            anchor,
            horizon_months,
            starting_balance: round2(payload.starting_balance.unwrap_or(Decimal::ZERO)),
            contributor_age,
            scheme,
        },
        breakdown_month: payload.breakdown_month,
    })
}

fn execute_project(request: ProjectRequest) -> ProjectResponse {
    let settings = &request.settings;
    let points = run_projection(&request.incomes, &request.expenses, settings);
    let summary = summarize(&points, settings.starting_balance);
    let breakdown = request
        .breakdown_month
        .map(|offset| month_breakdown(&request.incomes, &request.expenses, settings, offset));

    tracing::info!(
        anchor = %settings.anchor,
        horizon = settings.horizon_months,
        ending_balance = %summary.ending_balance,
        "projection complete"
    );

    ProjectResponse {
        anchor_month: settings.anchor,
        horizon_months: settings.horizon_months,
        starting_balance: settings.starting_balance,
        points,
        summary,
        breakdown,
    }
}

fn build_contribution_response(
    payload: ContributionPayload,
    defaults: &EngineDefaults,
) -> Result<ContributionResponse, ApiError> {
    let Some(gross_amount) = payload.gross_amount else {
        return Err(ApiError::InvalidRequest("grossAmount is required".to_string()));
    };
    if gross_amount < Decimal::ZERO {
        return Err(ApiError::InvalidRequest("grossAmount must be >= 0".to_string()));
    }

    let age = validate_age(payload.age.or(defaults.age))?;
    let scheme = build_scheme(payload.wage_ceiling.unwrap_or(defaults.wage_ceiling))?;
    let contribution = scheme.compute_contribution(gross_amount, age);
    let sub_accounts = scheme.compute_sub_account_allocation(contribution.total_amount, age);

    Ok(ContributionResponse {
        contributor_age: age.unwrap_or(DEFAULT_CONTRIBUTOR_AGE),
        wage_ceiling: scheme.wage_ceiling,
        contribution,
        sub_accounts,
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<(), ApiError> {
    match cli.command {
        Command::Serve(args) => run_http_server(args.port, args.defaults).await,
        Command::Project(args) => {
            let raw = std::fs::read_to_string(&args.input).map_err(|source| ApiError::ReadInput {
                path: args.input.clone(),
                source,
            })?;
            let mut payload = serde_json::from_str::<ProjectPayload>(&raw)?;
            if args.starting_balance.is_some() {
                payload.starting_balance = args.starting_balance;
            }
            if args.as_of.is_some() {
                payload.as_of = args.as_of;
            }
            let today = chrono::Local::now().date_naive();
            let request = build_project_request(payload, &args.defaults, today)?;
            let response = execute_project(request);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Contribution(args) => {
            let payload = ContributionPayload {
                gross_amount: Some(args.gross),
                ..ContributionPayload::default()
            };
            let response = build_contribution_response(payload, &args.defaults)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

pub async fn run_http_server(port: u16, defaults: EngineDefaults) -> Result<(), ApiError> {
    build_scheme(defaults.wage_ceiling)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/project", post(project_post_handler))
        .route(
            "/api/contribution",
            get(contribution_get_handler).post(contribution_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(defaults);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "projection API listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_post_handler(
    State(defaults): State<EngineDefaults>,
    Json(payload): Json<ProjectPayload>,
) -> Response {
    let today = chrono::Local::now().date_naive();
    match build_project_request(payload, &defaults, today) {
        Ok(request) => json_response(StatusCode::OK, execute_project(request)),
        Err(err) => err.into_response(),
    }
}

async fn contribution_get_handler(
    State(defaults): State<EngineDefaults>,
    Query(payload): Query<ContributionPayload>,
) -> Response {
    contribution_handler_impl(payload, &defaults)
}

async fn contribution_post_handler(
    State(defaults): State<EngineDefaults>,
    Json(payload): Json<ContributionPayload>,
) -> Response {
    contribution_handler_impl(payload, &defaults)
}

fn contribution_handler_impl(payload: ContributionPayload, defaults: &EngineDefaults) -> Response {
    match build_contribution_response(payload, defaults) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => err.into_response(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
