// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

use crate::domain::models::job::{Job, JobKind};
use crate::domain::models::target::{RegisterOutcome, Target, TargetState};
use crate::domain::repositories::frontier_repository::FrontierRepository;
use crate::queue::job_queue::JobQueue;
use crate::utils::url_utils;

/// 种子提交请求
#[derive(Debug, Deserialize)]
pub struct SeedRequest {
    /// 待注册的种子地址列表
    pub urls: Vec<String>,
}

/// 种子提交响应
#[derive(Debug, Serialize)]
pub struct SeedResponse {
    /// 新注册并入队的数量
    pub registered: usize,
    /// 已存在的数量
    pub duplicates: usize,
    /// 无法规范化的数量
    pub rejected: usize,
}

/// 提交种子地址
///
/// 规范化每个地址，注册到前沿存储并为新目标入队抓取任务。
/// 种子的深度为0
pub async fn submit_seeds<F, Q>(
    Extension(frontier): Extension<Arc<F>>,
    Extension(queue): Extension<Arc<Q>>,
    Extension(max_fetch_attempts): Extension<MaxFetchAttempts>,
    Json(request): Json<SeedRequest>,
) -> Response
where
    F: FrontierRepository,
    Q: JobQueue,
{
    let mut response = SeedResponse {
        registered: 0,
        duplicates: 0,
        rejected: 0,
    };

    for raw in &request.urls {
        let Some(canonical) = Url::parse(raw.trim())
            .ok()
            .and_then(|u| url_utils::canonicalize(&u))
        else {
            response.rejected += 1;
            continue;
        };

        let target = Target::discovered(
            canonical.url.clone(),
            canonical.netloc,
            None,
            0,
            canonical.is_onion,
        );

        match frontier.register(&target).await {
            Ok(RegisterOutcome::New) => {
                let job = Job::new(JobKind::Fetch, canonical.url.clone(), max_fetch_attempts.0);
                if let Err(e) = queue.enqueue(job).await {
                    error!("Failed to enqueue seed fetch job: {}", e);
                    return internal_error();
                }
                if let Err(e) = frontier.mark(&canonical.url, TargetState::Queued, 0).await {
                    error!("Failed to mark seed target queued: {}", e);
                    return internal_error();
                }
                response.registered += 1;
            }
            Ok(RegisterOutcome::Duplicate) => response.duplicates += 1,
            Err(e) => {
                error!("Failed to register seed: {}", e);
                return internal_error();
            }
        }
    }

    info!(
        "Seed submission: registered={}, duplicates={}, rejected={}",
        response.registered, response.duplicates, response.rejected
    );
    (StatusCode::OK, Json(response)).into_response()
}

/// 目标查询参数
#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    /// 规范化标识符
    pub url: String,
}

/// 查询前沿中的目标
pub async fn get_target<F>(
    Extension(frontier): Extension<Arc<F>>,
    Query(query): Query<TargetQuery>,
) -> Response
where
    F: FrontierRepository,
{
    match frontier.query(&query.url).await {
        Ok(Some(target)) => (StatusCode::OK, Json(target)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "target not found"})),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to query target: {}", e);
            internal_error()
        }
    }
}

/// 抓取任务投递预算的Extension载体
#[derive(Clone, Copy, Debug)]
pub struct MaxFetchAttempts(pub i32);

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal error"})),
    )
        .into_response()
}
