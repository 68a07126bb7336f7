use rocket::Route;

mod admin;
mod audit;
mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(voter::routes());
    routes.extend(admin::routes());
    routes.extend(audit::routes());
    routes
}

/// Route test fixtures: a local client over the in-memory harness.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use rocket::{
        http::Header,
        local::asynchronous::{Client, LocalRequest},
    };

    use crate::model::api::actor::{ADMIN_ID_HEADER, VOTER_ID_HEADER};
    use crate::service::harness::{Harness, ADMIN};
    use crate::store::memory::{FixedClock, MemoryStore};

    /// A tracked client over the harness's services, plus handles on its
    /// store and clock.
    pub async fn client(harness: Harness) -> (Client, Arc<MemoryStore>, Arc<FixedClock>) {
        let Harness {
            store,
            clock,
            services,
            ..
        } = harness;
        let rocket = services.manage(rocket::build().mount("/", super::routes()));
        let client = Client::tracked(rocket).await.unwrap();
        (client, store, clock)
    }

    pub fn as_voter(request: LocalRequest<'_>, voter_id: u32) -> LocalRequest<'_> {
        request.header(Header::new(VOTER_ID_HEADER, voter_id.to_string()))
    }

    pub fn as_admin(request: LocalRequest<'_>) -> LocalRequest<'_> {
        request.header(Header::new(ADMIN_ID_HEADER, ADMIN.to_string()))
    }
}
