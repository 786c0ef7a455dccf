//! Session contract of the API's auth endpoints
//!
//! Anonymous, malformed and expired bearer tokens must all be turned away
//! with 401. The checks that need a real session use the configured
//! `auth_token` and skip without one; interactive SSO is never driven.

use async_trait::async_trait;
use tracing::info;

use super::log_response;
use crate::auth::{expired_token, AuthUser, INVALID_TOKEN};
use crate::error::E2eError;
use crate::runner::Suite;
use crate::scenario::{ensure, skip, ScenarioContext, StepResult, SuiteRecorder};
use crate::status::StatusSet;
use crate::telemetry::log_step;

pub struct AuthContract;

#[async_trait(?Send)]
impl Suite for AuthContract {
    fn name(&self) -> &str {
        "auth-contract"
    }

    fn description(&self) -> &str {
        "401 for missing, invalid and expired tokens; /auth/me and logout"
    }

    fn tags(&self) -> Vec<String> {
        vec!["api".into(), "auth".into()]
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        rec.case("rejects unauthenticated requests", || rejects(ctx, None))
            .await;
        rec.case("rejects an invalid token", || rejects(ctx, Some(Token::Invalid)))
            .await;
        rec.case("rejects an expired token", || rejects(ctx, Some(Token::Expired)))
            .await;
        rec.case("returns user information for a valid token", || me(ctx))
            .await;

        let mut chain = rec.serial();
        let logged_out = chain.step("logout", logout(ctx)).await;
        chain
            .then("session is gone after logout", logged_out, |()| session_gone(ctx))
            .await;
    }
}

#[derive(Clone, Copy)]
enum Token {
    Invalid,
    Expired,
}

fn session_token(ctx: &ScenarioContext) -> StepResult<&str> {
    match ctx.config.auth_token.as_deref() {
        Some(token) => Ok(token),
        None => skip("No session token configured (E2E_AUTH_TOKEN)"),
    }
}

async fn rejects(ctx: &ScenarioContext, token: Option<Token>) -> StepResult<()> {
    ctx.require_api().await?;
    let (label, bearer) = match token {
        None => ("no", None),
        Some(Token::Invalid) => ("an invalid", Some(INVALID_TOKEN.to_string())),
        Some(Token::Expired) => (
            "an expired",
            Some(expired_token(&ctx.config.test_user, &ctx.config.jwt_secret)?),
        ),
    };
    log_step(&format!("Requesting /api/auth/me with {} token", label));

    let resp = ctx.api.auth_me(bearer.as_deref()).await?;
    log_response("auth/me response", &resp);
    resp.expect_status(&StatusSet::exactly(401))?;
    Ok(())
}

async fn me(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_api().await?;
    let token = session_token(ctx)?;
    log_step("Requesting /api/auth/me with the session token");

    let resp = ctx.api.auth_me(Some(token)).await?;
    log_response("auth/me response", &resp);
    resp.expect_status(&StatusSet::exactly(200))?;

    let user = AuthUser::from_me(&resp.body).ok_or_else(|| {
        E2eError::AssertionFailed(format!("unexpected /api/auth/me format: {}", resp.raw))
    })?;
    ensure(!user.id.is_empty(), "user_id missing from /api/auth/me")?;
    info!("Signed in as {} <{}> via {}", user.name, user.email, user.provider);
    Ok(())
}

async fn logout(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_api().await?;
    let token = session_token(ctx)?;
    log_step("Logging out");

    let redirect = format!("{}/api/health", ctx.config.functions_url.trim_end_matches('/'));
    let resp = ctx.api.logout(token, &redirect).await?;
    log_response("Logout response", &resp);
    ensure(
        resp.status < 500,
        format!("{} returned {}", resp.endpoint, resp.status),
    )?;
    Ok(())
}

/// The local session is dropped on logout; the API must treat the caller as anonymous
async fn session_gone(ctx: &ScenarioContext) -> StepResult<()> {
    log_step("Checking the session is gone");
    let resp = ctx.api.auth_me(None).await?;
    log_response("auth/me after logout", &resp);
    resp.expect_status(&StatusSet::exactly(401))?;
    Ok(())
}
