//! In-memory repositories and an HTTP harness for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use tower_cookies::cookie::Cookie;
use zeroize::Zeroizing;

use crate::{
    config::{Config, OAuthConfig},
    crypto::token,
    error::{AppError, Result},
    middleware_layer::auth::{IMPERSONATE_COOKIE, SESSION_COOKIE},
    models::{
        checklist::{
            AnswerDetail, Checklist, ChecklistDetail, ChecklistFilter, ChecklistStats,
            ChecklistSummary, NewChecklist,
        },
        identity::CurrentUser,
        question::Question,
        role::Role,
        session::{DelegatedTokens, NewSession, SessionRecord},
        store::{Store, StoreAssignment},
        user::{LoginProfile, NewUser, User},
    },
    repositories::{
        ChecklistRepository, QuestionRepository, SessionRepository, StoreRepository,
        UserRepository, question::QuestionFields, store::StoreFields,
    },
    routes,
    services::identity_provider::{
        IdentityProvider, ProviderProfile, ProviderTokens, PublicAuthConfig,
    },
    state::{AppState, Backends},
};

struct StoredSession {
    id: i64,
    token: String,
    user_id: i32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_activity: Option<DateTime<Utc>>,
    delegated: DelegatedTokens,
}

struct StoredAssignment {
    id: i32,
    user_id: i32,
    store_id: i32,
    assigned_by: Option<i32>,
    assigned_at: DateTime<Utc>,
    is_active: bool,
}

#[derive(Default)]
struct Tables {
    last_id: i32,
    users: Vec<User>,
    sessions: Vec<StoredSession>,
    questions: Vec<Question>,
    stores: Vec<Store>,
    assignments: Vec<StoredAssignment>,
    checklists: Vec<Checklist>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, id: i32) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn session_record(&self, s: &StoredSession) -> Option<SessionRecord> {
        let user = self.user(s.user_id)?;
        Some(SessionRecord {
            id: s.id,
            token: s.token.clone(),
            user_id: s.user_id,
            created_at: s.created_at,
            expires_at: s.expires_at,
            last_activity: s.last_activity,
            delegated_access_token: s.delegated.access_token.clone(),
            delegated_refresh_token: s.delegated.refresh_token.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            is_approved: user.is_approved,
            is_active: user.is_active,
        })
    }

    fn insert_session(&mut self, user_id: i32, token: String, expires_at: DateTime<Utc>) {
        let id = i64::from(self.next_id());
        self.sessions.push(StoredSession {
            id,
            token,
            user_id,
            created_at: Utc::now(),
            expires_at,
            last_activity: None,
            delegated: DelegatedTokens::default(),
        });
    }

    fn summary(&self, c: &Checklist) -> ChecklistSummary {
        let store = self.stores.iter().find(|s| s.id == c.store_id);
        ChecklistSummary {
            id: c.id,
            document_number: c.document_number.clone(),
            store_id: c.store_id,
            store_name: store.map(|s| s.store_name.clone()).unwrap_or_default(),
            store_code: store.and_then(|s| s.store_code.clone()),
            audit_date: c.audit_date,
            submitted_by: c.submitted_by,
            submitted_by_name: self
                .user(c.submitted_by)
                .map(|u| u.display_name.clone())
                .unwrap_or_default(),
            total_coefficient: c.total_coefficient,
            total_earned: c.total_earned,
            score_percentage: c.score_percentage,
            notes: c.notes.clone(),
            created_at: c.created_at,
        }
    }

    fn detail(&self, c: &Checklist) -> ChecklistDetail {
        ChecklistDetail {
            summary: self.summary(c),
            answers: c
                .answers
                .iter()
                .map(|a| AnswerDetail {
                    answer: a.clone(),
                    question_text: self
                        .questions
                        .iter()
                        .find(|q| q.id == a.question_id)
                        .map(|q| q.question_text.clone())
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }

    fn filtered(&self, filter: &ChecklistFilter) -> Vec<&Checklist> {
        let mut rows: Vec<&Checklist> = self
            .checklists
            .iter()
            .filter(|c| filter.matches(c.store_id, c.submitted_by, c.audit_date))
            .collect();
        rows.sort_by(|a, b| b.audit_date.cmp(&a.audit_date).then(b.id.cmp(&a.id)));
        rows
    }
}

/// Every repository over one set of in-memory tables.
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    document_sequence: AtomicI64,
    fail_answer_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(Tables::default()),
            document_sequence: AtomicI64::new(0),
            fail_answer_writes: AtomicBool::new(false),
        })
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn seed_user(&self, email: &str, role: Role) -> User {
        let mut t = self.tables();
        let id = t.next_id();
        let email = email.to_lowercase();
        let user = User {
            id,
            display_name: email.split('@').next().unwrap_or_default().to_string(),
            email,
            external_id: None,
            role,
            is_approved: role.is_approved(),
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        };
        t.users.push(user.clone());
        user
    }

    pub fn user_by_email(&self, email: &str) -> Option<User> {
        self.tables()
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    pub fn set_active(&self, user_id: i32, active: bool) {
        if let Some(u) = self.tables().users.iter_mut().find(|u| u.id == user_id) {
            u.is_active = active;
        }
    }

    /// Adds a session expiring `offset` from now, returning its token.
    pub fn seed_session(&self, user_id: i32, offset: chrono::Duration) -> String {
        let token = token::generate(user_id);
        self.seed_session_with_token(user_id, &token, offset);
        token
    }

    pub fn seed_session_with_token(&self, user_id: i32, token: &str, offset: chrono::Duration) {
        self.tables()
            .insert_session(user_id, token.to_string(), Utc::now() + offset);
    }

    /// Stored sessions of a user, expired ones included.
    pub fn session_count_for(&self, user_id: i32) -> usize {
        self.tables()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .count()
    }

    pub fn seed_store(&self, name: &str) -> Store {
        let mut t = self.tables();
        let store = Store {
            id: t.next_id(),
            store_name: name.to_string(),
            store_code: None,
            is_active: true,
            created_at: Utc::now(),
        };
        t.stores.push(store.clone());
        store
    }

    pub fn seed_assignment(&self, user_id: i32, store_id: i32) {
        let mut t = self.tables();
        let id = t.next_id();
        t.assignments.push(StoredAssignment {
            id,
            user_id,
            store_id,
            assigned_by: None,
            assigned_at: Utc::now(),
            is_active: true,
        });
    }

    pub fn seed_question(&self, text: &str, coefficient: f64) -> Question {
        let mut t = self.tables();
        let sort_order = t.questions.len() as i32;
        let question = Question {
            id: t.next_id(),
            question_text: text.to_string(),
            coefficient,
            sort_order,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        };
        t.questions.push(question.clone());
        question
    }

    pub fn checklist_count(&self) -> usize {
        self.tables().checklists.len()
    }

    /// Makes every later checklist insert fail while writing answers.
    pub fn fail_answer_writes(&self) {
        self.fail_answer_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionRepository for MemoryBackend {
    async fn replace_for_user(&self, session: &NewSession) -> Result<()> {
        let mut t = self.tables();
        t.sessions.retain(|s| s.user_id != session.user_id);
        let id = i64::from(t.next_id());
        t.sessions.push(StoredSession {
            id,
            token: session.token.clone(),
            user_id: session.user_id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            last_activity: None,
            delegated: session.delegated.clone(),
        });
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionRecord>> {
        let t = self.tables();
        Ok(t
            .sessions
            .iter()
            .find(|s| s.token == token)
            .and_then(|s| t.session_record(s)))
    }

    async fn touch(&self, token: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(s) = self.tables().sessions.iter_mut().find(|s| s.token == token) {
            s.last_activity = Some(at);
        }
        Ok(())
    }

    async fn delete_by_token(&self, token: &str) -> Result<u64> {
        let mut t = self.tables();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.token != token);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut t = self.tables();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.expires_at > now);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn list_live(&self, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let t = self.tables();
        let mut live: Vec<SessionRecord> = t
            .sessions
            .iter()
            .filter_map(|s| t.session_record(s))
            .filter(|r| r.is_live(now))
            .collect();
        live.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then(a.user_id.cmp(&b.user_id))
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(live)
    }

    async fn delete_by_id(&self, id: i64) -> Result<u64> {
        let mut t = self.tables();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.id != id);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn delete_for_user(&self, user_id: i32) -> Result<u64> {
        let mut t = self.tables();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.user_id != user_id);
        Ok((before - t.sessions.len()) as u64)
    }
}

#[async_trait]
impl UserRepository for MemoryBackend {
    async fn find_by_id(&self, id: i32) -> Result<Option<User>> {
        Ok(self.tables().user(id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.user_by_email(email))
    }

    async fn create(&self, user: &NewUser) -> Result<User> {
        let mut t = self.tables();
        if t.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Internal("duplicate email".to_string()));
        }
        let created = User {
            id: t.next_id(),
            email: user.email.to_lowercase(),
            display_name: user.display_name.clone(),
            external_id: user.external_id.clone(),
            role: user.role,
            is_approved: user.is_approved,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        };
        t.users.push(created.clone());
        Ok(created)
    }

    async fn record_login(&self, id: i32, profile: &LoginProfile) -> Result<User> {
        let mut t = self.tables();
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        user.email = profile.email.to_lowercase();
        user.display_name = profile.display_name.clone();
        user.external_id = Some(profile.external_id.clone());
        user.last_login_at = Some(Utc::now());
        Ok(user.clone())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut users = self.tables().users.clone();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn update_role(&self, id: i32, role: Role) -> Result<User> {
        let mut t = self.tables();
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        user.role = role;
        user.is_approved = role.is_approved();
        Ok(user.clone())
    }

    async fn toggle_active(&self, id: i32) -> Result<User> {
        let mut t = self.tables();
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        user.is_active = !user.is_active;
        Ok(user.clone())
    }
}

fn sorted_questions(mut questions: Vec<Question>) -> Vec<Question> {
    questions.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
    questions
}

#[async_trait]
impl QuestionRepository for MemoryBackend {
    async fn list_active(&self) -> Result<Vec<Question>> {
        let active = self
            .tables()
            .questions
            .iter()
            .filter(|q| q.is_active)
            .cloned()
            .collect();
        Ok(sorted_questions(active))
    }

    async fn list_all(&self) -> Result<Vec<Question>> {
        Ok(sorted_questions(self.tables().questions.clone()))
    }

    async fn create(&self, fields: &QuestionFields) -> Result<Question> {
        let mut t = self.tables();
        let question = Question {
            id: t.next_id(),
            question_text: fields.question_text.clone(),
            coefficient: fields.coefficient,
            sort_order: fields.sort_order,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        };
        t.questions.push(question.clone());
        Ok(question)
    }

    async fn update(&self, id: i32, fields: &QuestionFields) -> Result<Question> {
        let mut t = self.tables();
        let q = t
            .questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(AppError::NotFound)?;
        q.question_text = fields.question_text.clone();
        q.coefficient = fields.coefficient;
        q.sort_order = fields.sort_order;
        q.updated_at = Some(Utc::now());
        Ok(q.clone())
    }

    async fn toggle_active(&self, id: i32) -> Result<Question> {
        let mut t = self.tables();
        let q = t
            .questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(AppError::NotFound)?;
        q.is_active = !q.is_active;
        Ok(q.clone())
    }
}

fn sorted_stores(mut stores: Vec<Store>) -> Vec<Store> {
    stores.sort_by(|a, b| a.store_name.cmp(&b.store_name).then(a.id.cmp(&b.id)));
    stores
}

#[async_trait]
impl StoreRepository for MemoryBackend {
    async fn list_all(&self) -> Result<Vec<Store>> {
        Ok(sorted_stores(self.tables().stores.clone()))
    }

    async fn list_active(&self) -> Result<Vec<Store>> {
        let active = self
            .tables()
            .stores
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        Ok(sorted_stores(active))
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Store>> {
        Ok(self.tables().stores.iter().find(|s| s.id == id).cloned())
    }

    async fn create(&self, fields: &StoreFields) -> Result<Store> {
        let mut t = self.tables();
        let store = Store {
            id: t.next_id(),
            store_name: fields.store_name.clone(),
            store_code: fields.store_code.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        t.stores.push(store.clone());
        Ok(store)
    }

    async fn update(&self, id: i32, fields: &StoreFields) -> Result<Store> {
        let mut t = self.tables();
        let s = t
            .stores
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(AppError::NotFound)?;
        s.store_name = fields.store_name.clone();
        s.store_code = fields.store_code.clone();
        Ok(s.clone())
    }

    async fn toggle_active(&self, id: i32) -> Result<Store> {
        let mut t = self.tables();
        let s = t
            .stores
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(AppError::NotFound)?;
        s.is_active = !s.is_active;
        Ok(s.clone())
    }

    async fn stores_for_user(&self, user_id: i32) -> Result<Vec<Store>> {
        let t = self.tables();
        let stores = t
            .stores
            .iter()
            .filter(|s| {
                s.is_active
                    && t.assignments
                        .iter()
                        .any(|a| a.is_active && a.user_id == user_id && a.store_id == s.id)
            })
            .cloned()
            .collect();
        Ok(sorted_stores(stores))
    }

    async fn is_assigned(&self, user_id: i32, store_id: i32) -> Result<bool> {
        Ok(self
            .tables()
            .assignments
            .iter()
            .any(|a| a.is_active && a.user_id == user_id && a.store_id == store_id))
    }

    async fn assign(&self, user_id: i32, store_id: i32, assigned_by: i32) -> Result<()> {
        let mut t = self.tables();
        if let Some(a) = t
            .assignments
            .iter_mut()
            .find(|a| a.user_id == user_id && a.store_id == store_id)
        {
            a.is_active = true;
            a.assigned_by = Some(assigned_by);
            a.assigned_at = Utc::now();
            return Ok(());
        }
        let id = t.next_id();
        t.assignments.push(StoredAssignment {
            id,
            user_id,
            store_id,
            assigned_by: Some(assigned_by),
            assigned_at: Utc::now(),
            is_active: true,
        });
        Ok(())
    }

    async fn unassign(&self, user_id: i32, store_id: i32) -> Result<bool> {
        let mut t = self.tables();
        match t
            .assignments
            .iter_mut()
            .find(|a| a.is_active && a.user_id == user_id && a.store_id == store_id)
        {
            Some(a) => {
                a.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_assignments(&self) -> Result<Vec<StoreAssignment>> {
        let t = self.tables();
        let mut rows: Vec<StoreAssignment> = t
            .assignments
            .iter()
            .filter(|a| a.is_active)
            .filter_map(|a| {
                let user = t.user(a.user_id)?;
                let store = t.stores.iter().find(|s| s.id == a.store_id)?;
                Some(StoreAssignment {
                    id: a.id,
                    user_id: a.user_id,
                    store_id: a.store_id,
                    assigned_at: a.assigned_at,
                    is_active: a.is_active,
                    user_name: user.display_name.clone(),
                    user_email: user.email.clone(),
                    store_name: store.store_name.clone(),
                    store_code: store.store_code.clone(),
                    assigned_by_name: a
                        .assigned_by
                        .and_then(|id| t.user(id))
                        .map(|u| u.display_name.clone()),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.user_name
                .cmp(&b.user_name)
                .then(a.store_name.cmp(&b.store_name))
        });
        Ok(rows)
    }
}

#[async_trait]
impl ChecklistRepository for MemoryBackend {
    async fn next_document_sequence(&self) -> Result<i64> {
        Ok(self.document_sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert(&self, checklist: &NewChecklist) -> Result<Checklist> {
        if self.fail_answer_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("answer insert failed".to_string()));
        }
        let mut t = self.tables();
        let stored = Checklist {
            id: t.next_id(),
            document_number: checklist.document_number.clone(),
            store_id: checklist.store_id,
            audit_date: checklist.audit_date,
            submitted_by: checklist.submitted_by,
            total_coefficient: checklist.total_coefficient,
            total_earned: checklist.total_earned,
            score_percentage: checklist.score_percentage,
            notes: checklist.notes.clone(),
            created_at: Utc::now(),
            answers: checklist.answers.clone(),
        };
        t.checklists.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<ChecklistDetail>> {
        let t = self.tables();
        Ok(t.checklists.iter().find(|c| c.id == id).map(|c| t.detail(c)))
    }

    async fn find_by_document_number(
        &self,
        document_number: &str,
    ) -> Result<Option<ChecklistDetail>> {
        let t = self.tables();
        Ok(t
            .checklists
            .iter()
            .find(|c| c.document_number == document_number)
            .map(|c| t.detail(c)))
    }

    async fn list(&self, filter: &ChecklistFilter) -> Result<Vec<ChecklistSummary>> {
        let t = self.tables();
        let limit = filter
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(0));
        Ok(t.filtered(filter)
            .into_iter()
            .take(limit)
            .map(|c| t.summary(c))
            .collect())
    }

    async fn stats(&self, filter: &ChecklistFilter) -> Result<ChecklistStats> {
        let t = self.tables();
        let scores: Vec<f64> = t
            .filtered(filter)
            .iter()
            .map(|c| c.score_percentage)
            .collect();
        if scores.is_empty() {
            return Ok(ChecklistStats::default());
        }
        Ok(ChecklistStats {
            total_checklists: scores.len() as i64,
            average_score: Some(scores.iter().sum::<f64>() / scores.len() as f64),
            min_score: scores.iter().copied().reduce(f64::min),
            max_score: scores.iter().copied().reduce(f64::max),
        })
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        let mut t = self.tables();
        let before = t.checklists.len();
        t.checklists.retain(|c| c.id != id);
        Ok(t.checklists.len() < before)
    }
}

/// The request identity of a seeded user.
pub fn current_user(user: &User) -> CurrentUser {
    CurrentUser {
        id: user.id,
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        role: user.role,
        is_approved: user.is_approved,
        is_active: user.is_active,
        delegated_access_token: None,
    }
}

/// An identity provider that answers every code with one fixed profile, or fails.
pub struct FakeIdentityProvider {
    profile: Option<ProviderProfile>,
}

impl FakeIdentityProvider {
    pub fn returning(subject: &str, email: &str) -> Self {
        Self {
            profile: Some(ProviderProfile {
                id: subject.to_string(),
                mail: Some(email.to_string()),
                user_principal_name: None,
                display_name: Some("Test User".to_string()),
            }),
        }
    }

    pub fn failing() -> Self {
        Self { profile: None }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let state: String = url::form_urlencoded::byte_serialize(state.as_bytes()).collect();
        Ok(format!("https://login.test/authorize?state={}", state))
    }

    fn public_config(&self) -> PublicAuthConfig {
        PublicAuthConfig {
            client_id: "test-client".to_string(),
            tenant_id: "test-tenant".to_string(),
            redirect_uri: "http://localhost/auth/callback".to_string(),
            scopes: vec!["openid".to_string()],
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens> {
        match self.profile {
            Some(_) => Ok(ProviderTokens {
                access_token: format!("access-{}", code),
                refresh_token: None,
            }),
            None => Err(AppError::IdentityProvider("code rejected".to_string())),
        }
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile> {
        self.profile
            .clone()
            .ok_or_else(|| AppError::IdentityProvider("profile unavailable".to_string()))
    }
}

pub fn test_config(upload_dir: &Path) -> Config {
    Config {
        database_url: "postgres://localhost/unused".to_string(),
        db_pool_size: 1,
        bind_addr: ([127, 0, 0, 1], 0).into(),
        production: false,
        session_duration_hours: 24,
        session_cleanup_interval_secs: 3600,
        admin_email: Some("admin@example.com".to_string()),
        oauth: OAuthConfig {
            client_id: "test-client".to_string(),
            tenant_id: "test-tenant".to_string(),
            client_secret: Zeroizing::new("test-secret".to_string()),
            redirect_uri: "http://localhost/auth/callback".to_string(),
            scopes: vec!["openid".to_string()],
        },
        upload_dir: upload_dir.to_path_buf(),
        max_image_bytes: 1024 * 1024,
        document_prefix: "AMC".to_string(),
    }
}

const MULTIPART_BOUNDARY: &str = "checklist-test-boundary";

/// The full router over a fresh [`MemoryBackend`].
pub struct TestApp {
    pub backend: Arc<MemoryBackend>,
    pub state: AppState,
    router: Router,
    _uploads: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_identity(FakeIdentityProvider::returning("sub-default", "user@example.com"))
    }

    pub fn with_identity(identity: impl IdentityProvider + 'static) -> Self {
        Self::with_config(identity, |_| {})
    }

    /// Like [`TestApp::with_identity`], with a chance to adjust the config.
    pub fn with_config(
        identity: impl IdentityProvider + 'static,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let mut config = test_config(uploads.path());
        configure(&mut config);
        let state = AppState::from_backends(
            config,
            Backends {
                sessions: backend.clone(),
                users: backend.clone(),
                questions: backend.clone(),
                stores: backend.clone(),
                checklists: backend.clone(),
                identity: Arc::new(identity),
            },
        );
        let router = routes::router(state.clone());
        Self {
            backend,
            state,
            router,
            _uploads: uploads,
        }
    }

    /// Issues a session for `user` and returns its token.
    pub async fn login(&self, user: &User) -> String {
        self.state
            .sessions
            .create_session(user.id, DelegatedTokens::default())
            .await
            .unwrap()
            .token
    }

    fn request(
        method: &str,
        path: &str,
        token: Option<&str>,
        impersonate: Option<&str>,
    ) -> axum::http::request::Builder {
        let mut cookies = Vec::new();
        if let Some(token) = token {
            cookies.push(format!("{}={}", SESSION_COOKIE, token));
        }
        if let Some(target) = impersonate {
            cookies.push(format!("{}={}", IMPERSONATE_COOKIE, target));
        }
        let builder = Request::builder().method(method).uri(path);
        if cookies.is_empty() {
            builder
        } else {
            builder.header(header::COOKIE, cookies.join("; "))
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, HeaderMap, Value) {
        let request = Self::request("GET", path, token, None)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn get_with(
        &self,
        path: &str,
        token: &str,
        impersonate: Option<&str>,
    ) -> (StatusCode, HeaderMap, Value) {
        let request = Self::request("GET", path, Some(token), impersonate)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        token: Option<&str>,
        impersonate: Option<&str>,
        body: &Value,
    ) -> (StatusCode, HeaderMap, Value) {
        let request = Self::request("POST", path, token, impersonate)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> (StatusCode, HeaderMap, Value) {
        let request = Self::request("DELETE", path, token, None)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Posts a multipart form of text fields plus file fields.
    pub async fn post_multipart(
        &self,
        path: &str,
        token: Option<&str>,
        fields: &[(&str, &str)],
        files: &[(&str, &[u8])],
    ) -> (StatusCode, HeaderMap, Value) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"photo\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

        let request = Self::request("POST", path, token, None)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// The full `Set-Cookie` entry a response carries for `name`.
    pub fn set_cookie(headers: &HeaderMap, name: &str) -> Option<Cookie<'static>> {
        headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| Cookie::parse(v.to_string()).ok())
            .find(|c| c.name() == name)
    }

    /// The value a response sets for cookie `name`; `Some("")` for a removal.
    pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
        Self::set_cookie(headers, name).map(|c| c.value().to_string())
    }

    /// Names of the files currently in the upload directory.
    pub fn stored_files(&self) -> Vec<String> {
        std::fs::read_dir(self.state.images.root())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
        Self::cookie_value(headers, SESSION_COOKIE)
    }
}
