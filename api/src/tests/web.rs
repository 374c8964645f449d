/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use axum::body::Body;
use axum::response::Response;
use chrono::{Duration, Utc};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use tower::ServiceExt;

use crate::db::{FlavorStore, ReportStore};
use crate::model::keys::{HostId, ReportId};
use crate::model::report::Report;
use crate::tests::common::{self, create_test_env, rhel_manifest, TestEnv};
use crate::verifier::TrustReport;
use crate::web;

async fn send(env: &TestEnv, request: Request<Body>) -> Response {
    web::routes(env.report_service.clone())
        .oneshot(request)
        .await
        .unwrap()
}

fn get(uri: &str, accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(accept) = accept {
        builder = builder.header(ACCEPT, accept);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn stored_report(env: &TestEnv) -> Report {
    let host = env.create_host("web-host", Vec::new()).await;
    let now = Utc::now();
    let report = Report::new(
        host.id,
        TrustReport::default(),
        "<saml2:Assertion/>".to_string(),
        now,
        Duration::hours(24),
    );
    env.store.persist(&report).await.unwrap();
    report
}

fn content_type(response: &Response) -> &str {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_get_report_defaults_to_json() {
    let env = create_test_env();
    let report = stored_report(&env).await;

    for accept in [None, Some("*/*"), Some("application/json")] {
        let response = send(&env, get(&format!("/v2/reports/{}", report.id), accept)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type(&response), "application/json");
        let body: Report = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body, report);
    }
}

#[tokio::test]
async fn test_get_report_formats() {
    let env = create_test_env();
    let report = stored_report(&env).await;
    let uri = format!("/v2/reports/{}", report.id);

    let response = send(&env, get(&uri, Some("application/yaml"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/yaml");
    let body: Report = serde_yaml::from_str(&body_string(response).await).unwrap();
    assert_eq!(body.id, report.id);

    let response = send(&env, get(&uri, Some("application/xml"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/xml");
    let body = body_string(response).await;
    assert!(body.starts_with(&format!("<hostReport id=\"{}\"", report.id)));
    assert!(body.contains(&format!("hostId=\"{}\"", report.host_id)));

    let response = send(&env, get(&uri, Some("application/samlassertion+xml"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/samlassertion+xml");
    assert_eq!(body_string(response).await, "<saml2:Assertion/>");
}

#[tokio::test]
async fn test_get_report_errors() {
    let env = create_test_env();

    let response = send(&env, get(&format!("/v2/reports/{}", ReportId::new()), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Report not found"));

    let response = send(&env, get("/v2/reports/not-a-uuid", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let report = stored_report(&env).await;
    let response = send(
        &env,
        get(&format!("/v2/reports/{}", report.id), Some("text/html")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_latest_report_for_host() {
    let env = create_test_env();
    let report = stored_report(&env).await;

    let response = send(
        &env,
        get(&format!("/v2/hosts/{}/report", report.host_id), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Report = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body.id, report.id);

    let response = send(
        &env,
        get(&format!("/v2/hosts/{}/report", HostId::new()), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_and_delete_report() {
    let env = create_test_env();
    let flavorgroup_id = env.create_os_flavorgroup("rhel-7.4").await;
    env.store
        .create_flavor(&common::rhel_os_flavor(), Some(flavorgroup_id))
        .await
        .unwrap();
    let host = env.create_host("rhel-host", vec![flavorgroup_id]).await;
    env.manifest_source.respond(&host, Ok(rhel_manifest(&host)));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v2/reports")
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/samlassertion+xml")
        .body(Body::from(
            serde_json::json!({ "host_id": host.id, "force_update": true }).to_string(),
        ))
        .unwrap();
    let response = send(&env, request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let saml = body_string(response).await;
    assert!(saml.contains("TRUST_OVERALL"));

    let report = env
        .store
        .find_latest_for_host(host.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.saml, saml);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/v2/reports/{}", report.id))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&env, delete).await.status(), StatusCode::NO_CONTENT);
    let response = send(&env, get(&format!("/v2/reports/{}", report.id), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_report_for_unreachable_host() {
    let env = create_test_env();
    let host = env.create_host("offline-host", Vec::new()).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v2/reports")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "host_id": host.id }).to_string(),
        ))
        .unwrap();
    let response = send(&env, request).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
