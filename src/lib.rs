pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub mod models {
    pub mod api;
    pub mod quote;
    pub mod session;
    pub mod user;
    pub mod vote;
}

pub mod repositories {
    pub mod favorite;
    #[cfg(test)]
    pub mod memory;
    pub mod quote;
    pub mod user;
    pub mod vote;
}

pub mod services {
    pub mod auth;
    pub mod quotes;
    pub mod sessions;
    pub mod votes;
}

pub mod handlers {
    pub mod auth;
    pub mod quotes;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}
