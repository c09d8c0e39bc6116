pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod token;
}

pub mod services {
    pub mod auth;
    pub mod checklists;
    pub mod identity_provider;
    pub mod images;
    pub mod scoring;
    pub mod sessions;
}

pub mod handlers {
    pub mod admin_sessions;
    pub mod auth;
    pub mod checklists;
    pub mod directory;
    pub mod impersonation;
    pub mod response;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod checklist;
    pub mod directory;
}

#[cfg(test)]
mod testing;
