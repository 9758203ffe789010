use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{
    cin::Cin,
    domain::{
        AttemptId, AttemptSummary, CertificateId, CertificateSummary, HseUser, HseUserId,
        Question, QuestionId, TestVersion, UserProfile, VersionId,
    },
    error::ApiError,
    protocol::{
        AddQuestionRequest, AddQuestionResponse, AnswerSubmission, AttemptResult,
        AttemptSubmission, CertificatesEnvelope, CinRequest, DailyStats, FinishAcknowledgement,
        GenerateCertificateRequest, HseStatistics, HseUserFilters, HseUserLookup,
        HseUsersEnvelope, LoginRequest, LoginResponse, PresenceUpdate, PresenceUpdateResponse,
        QuestionDraft, QuestionsEnvelope, StatisticsEnvelope, StatsPeriod, SuccessResponse,
        TestHistory, VersionDraft, VersionMutationResponse, VersionsEnvelope,
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    auth::{AuthSession, SessionContext},
    backend::TestBackend,
    error::ClientError,
};

/// Image attached to a question create/update form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CurrentUserEnvelope {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

/// REST client for the HSE backend. Cheap to clone; clones share the session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(base_url: &str, session: SessionContext) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, session, None)
    }

    pub fn with_timeout(
        base_url: &str,
        session: SessionContext,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: normalize_base_url(base_url)?,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ClientError> {
        let body: LoginResponse = self
            .post_json(
                "api/auth/login",
                &LoginRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;
        info!(username = %body.user.username, role = body.user.role(), "auth: signed in");
        self.session.establish(AuthSession {
            token: body.token,
            user: body.user.clone(),
        });
        Ok(body.user)
    }

    /// Best-effort server logout; the local session is cleared regardless.
    pub async fn logout(&self) {
        if self.session.is_authenticated() {
            let result = match self.endpoint("api/auth/logout") {
                Ok(url) => self.execute(self.http.post(url)).await.map(drop),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                warn!(error = %err, "auth: server logout failed");
            }
        }
        self.session.clear();
        info!("auth: signed out");
    }

    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        let envelope: CurrentUserEnvelope = self.get_json("api/auth/current-user").await?;
        Ok(match envelope {
            CurrentUserEnvelope::Wrapped { user } => user,
            CurrentUserEnvelope::Bare(user) => user,
        })
    }

    pub async fn active_versions(&self) -> Result<Vec<TestVersion>, ClientError> {
        let envelope: VersionsEnvelope = self.get_json("api/versions/actives").await?;
        Ok(envelope.into_versions())
    }

    pub async fn list_versions(&self) -> Result<Vec<TestVersion>, ClientError> {
        let envelope: VersionsEnvelope = self.get_json("api/versions").await?;
        Ok(envelope.into_versions())
    }

    pub async fn create_version(
        &self,
        draft: &VersionDraft,
    ) -> Result<Option<TestVersion>, ClientError> {
        let response: VersionMutationResponse = self.post_json("api/versions", draft).await?;
        Ok(response.version)
    }

    pub async fn update_version(
        &self,
        version_id: VersionId,
        draft: &VersionDraft,
    ) -> Result<Option<TestVersion>, ClientError> {
        let request = self
            .http
            .put(self.endpoint(&format!("api/versions/{version_id}"))?)
            .json(draft);
        let response: VersionMutationResponse = self.execute(request).await?.json().await?;
        Ok(response.version)
    }

    pub async fn delete_version(&self, version_id: VersionId) -> Result<(), ClientError> {
        self.delete(&format!("api/versions/{version_id}")).await
    }

    pub async fn version_questions(
        &self,
        version_id: VersionId,
    ) -> Result<Vec<Question>, ClientError> {
        let envelope: QuestionsEnvelope = self
            .get_json(&format!("api/versions/{version_id}/questions"))
            .await?;
        Ok(envelope.into_questions())
    }

    /// Appends a question to a version and returns the resulting question order.
    pub async fn add_question_to_version(
        &self,
        version_id: VersionId,
        question_id: QuestionId,
    ) -> Result<Vec<QuestionId>, ClientError> {
        let response: AddQuestionResponse = self
            .post_json(
                &format!("api/versions/{version_id}/questions/add"),
                &AddQuestionRequest { question_id },
            )
            .await?;
        Ok(response.ordre_questions)
    }

    pub async fn list_questions(&self) -> Result<Vec<Question>, ClientError> {
        let envelope: QuestionsEnvelope = self.get_json("api/questions/").await?;
        Ok(envelope.into_questions())
    }

    pub async fn create_question(
        &self,
        draft: &QuestionDraft,
        image: Option<ImageUpload>,
    ) -> Result<Question, ClientError> {
        let form = question_form(draft, image)?;
        let request = self
            .http
            .post(self.endpoint("api/questions/")?)
            .multipart(form);
        Ok(self.execute(request).await?.json().await?)
    }

    pub async fn update_question(
        &self,
        question_id: QuestionId,
        draft: &QuestionDraft,
        image: Option<ImageUpload>,
    ) -> Result<Question, ClientError> {
        let form = question_form(draft, image)?;
        let request = self
            .http
            .put(self.endpoint(&format!("api/questions/{question_id}/"))?)
            .multipart(form);
        Ok(self.execute(request).await?.json().await?)
    }

    pub async fn delete_question(&self, question_id: QuestionId) -> Result<(), ClientError> {
        self.delete(&format!("api/questions/{question_id}/")).await
    }

    /// Certificates issued to `cin`. A 404 means the person has none.
    pub async fn search_certificates(
        &self,
        cin: &Cin,
    ) -> Result<Vec<CertificateSummary>, ClientError> {
        let result: Result<CertificatesEnvelope, ClientError> = self
            .post_json("api/certificats/recherche", &CinRequest { cni: cin.clone() })
            .await;
        match result {
            Ok(envelope) => Ok(envelope.certificats),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Raw PDF bytes. Expired certificates surface as `Api` errors with status 410.
    pub async fn download_certificate(
        &self,
        certificate_id: CertificateId,
    ) -> Result<Vec<u8>, ClientError> {
        let request = self
            .http
            .get(self.endpoint(&format!("api/certificats/{certificate_id}/pdf"))?);
        let bytes = self.execute(request).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    pub async fn generate_certificate(
        &self,
        attempt_id: AttemptId,
    ) -> Result<CertificateSummary, ClientError> {
        self.post_json(
            "api/certificates/generate-from-attempt/",
            &GenerateCertificateRequest { attempt_id },
        )
        .await
    }

    pub async fn list_hse_users(
        &self,
        filters: &HseUserFilters,
    ) -> Result<Vec<HseUser>, ClientError> {
        let envelope: HseUsersEnvelope = self
            .get_json_with_query("api/hse/users/", &filters.query_pairs())
            .await?;
        Ok(envelope.into_users())
    }

    pub async fn hse_user(&self, user_id: HseUserId) -> Result<HseUser, ClientError> {
        self.get_json(&format!("api/hse/users/{user_id}/")).await
    }

    /// Looks a person up by CIN. A 404 means nobody is registered under it.
    pub async fn find_hse_user_by_cin(&self, cin: &Cin) -> Result<Option<HseUser>, ClientError> {
        let result: Result<HseUserLookup, ClientError> = self
            .get_json_with_query("api/hse/users/search-by-cin/", &[("cin", cin.as_str())])
            .await;
        match result {
            Ok(lookup) => Ok(lookup.user.filter(|_| lookup.success)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Marks a person present or absent and returns the stored flag.
    pub async fn update_presence(
        &self,
        user_id: HseUserId,
        present: bool,
    ) -> Result<bool, ClientError> {
        let request = self
            .http
            .patch(self.endpoint(&format!("api/hse/users/{user_id}/update-presence/"))?)
            .json(&PresenceUpdate { presence: present });
        let response: PresenceUpdateResponse = self.execute(request).await?.json().await?;
        info!(user = %user_id, presence = response.presence, "hse: presence updated");
        Ok(response.presence)
    }

    pub async fn hse_user_history(
        &self,
        user_id: HseUserId,
    ) -> Result<Vec<AttemptSummary>, ClientError> {
        let history: TestHistory = self
            .get_json(&format!("api/hse/users/{user_id}/test-history/"))
            .await?;
        debug!(user = %user_id, attempts = history.attempts_count, "hse: history loaded");
        Ok(history.attempts)
    }

    pub async fn hse_statistics(&self) -> Result<HseStatistics, ClientError> {
        let envelope: StatisticsEnvelope = self.get_json("api/hse/users/statistics/").await?;
        Ok(envelope.statistics)
    }

    /// Dashboard percentages, optionally narrowed to a day, month or year.
    pub async fn daily_stats(&self, period: &StatsPeriod) -> Result<DailyStats, ClientError> {
        self.get_json_with_query("stats/hse/stats/", period).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let request = match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            if self.session.clear() {
                warn!(url = %response.url(), "auth: token rejected, session cleared");
            }
            return Err(ClientError::Unauthorized);
        }
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_response(status.as_u16(), &body);
        debug!(%url, status = status.as_u16(), message = %error.message, "api: request failed");
        Err(ClientError::Api {
            status: status.as_u16(),
            code: error.code,
            message: error.message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let request = self.http.get(self.endpoint(path)?);
        Ok(self.execute(request).await?.json().await?)
    }

    async fn get_json_with_query<Q, T>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.get(self.endpoint(path)?).query(query);
        Ok(self.execute(request).await?.json().await?)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.endpoint(path)?).json(body);
        Ok(self.execute(request).await?.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let request = self.http.delete(self.endpoint(path)?);
        self.execute(request).await?;
        Ok(())
    }
}

#[async_trait]
impl TestBackend for ApiClient {
    async fn verify_cin(&self, cin: &Cin) -> Result<bool, ClientError> {
        let response: SuccessResponse = self
            .post_json("api/test/verifier-cni", &CinRequest { cni: cin.clone() })
            .await?;
        Ok(response.success)
    }

    async fn fetch_questions(&self, version_id: VersionId) -> Result<Vec<Question>, ClientError> {
        let envelope: QuestionsEnvelope = self
            .get_json(&format!("api/test/{version_id}/questions"))
            .await?;
        Ok(envelope.into_questions())
    }

    async fn save_answer(
        &self,
        version_id: VersionId,
        submission: &AnswerSubmission,
    ) -> Result<(), ClientError> {
        let request = self
            .http
            .post(self.endpoint(&format!("api/test/{version_id}/reponse"))?)
            .json(submission);
        self.execute(request).await?;
        Ok(())
    }

    async fn finish_attempt(
        &self,
        version_id: VersionId,
        submission: &AttemptSubmission,
    ) -> Result<FinishAcknowledgement, ClientError> {
        self.post_json(&format!("api/test/{version_id}/terminer"), submission)
            .await
    }

    async fn fetch_result(&self, version_id: VersionId) -> Result<AttemptResult, ClientError> {
        self.get_json(&format!("api/test/{version_id}/resultat"))
            .await
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn question_form(draft: &QuestionDraft, image: Option<ImageUpload>) -> Result<Form, ClientError> {
    let mut form = Form::new();
    for (name, value) in draft.form_fields() {
        form = form.text(name, value);
    }
    if let Some(image) = image {
        let mime = image
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let part = Part::bytes(image.bytes)
            .file_name(image.filename)
            .mime_str(&mime)?;
        form = form.part("image", part);
    }
    Ok(form)
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
