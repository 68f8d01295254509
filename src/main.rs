use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use eventful_server::config::Config;
use eventful_server::routes::create_routes;
use eventful_server::services::email::EmailService;
use eventful_server::services::paystack::{PaymentGateway, PaystackClient};
use eventful_server::services::reminders;
use eventful_server::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Arc::new(Config::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let mailer = EmailService::new(&config.smtp).expect("Failed to configure email service");
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(PaystackClient::new(&config).expect("Failed to configure payment gateway"));

    let _scheduler = reminders::start_scheduler(pool.clone(), mailer.clone(), &config.reminder_cron)
        .await
        .expect("Failed to start reminder scheduler");

    tracing::info!(cron = %config.reminder_cron, "Reminder scheduler started");

    let state = AppState {
        db: pool,
        config: config.clone(),
        gateway,
        mailer,
    };

    let app: Router = create_routes(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
