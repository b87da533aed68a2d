use std::sync::Arc;

use serde_json::json;
use wrapp_blueprint::{Construct, DynError, Fields, Loader, Registry};

fn main() {
    let mut registry = Registry::new();
    registry
        .register::<DatabaseService>("database", "1.0.0")
        .unwrap();
    registry
        .register::<UserService>("user_service", "1.0.0")
        .unwrap();

    let pool = Loader::new(&registry)
        .load_raw(json!({
            "db": {
                "$reference": {"registry": {"schema": "database", "version": "1.0.0"}, "instance": "main_db"},
                "host": "localhost",
                "port": 5432
            },
            "svc": {
                "$reference": {"registry": {"schema": "user_service", "version": "1.0.0"}},
                "db": "$main_db",
                "cache_enabled": true
            }
        }))
        .unwrap();

    println!("{:?}", pool);
    let svc = pool.get::<UserService>().unwrap();
    println!("{:?}", svc)
}

#[derive(Debug)]
struct DatabaseService {
    host: String,
    port: u16,
}
impl Construct for DatabaseService {
    fn construct(fields: &mut Fields) -> Result<Self, DynError> {
        Ok(DatabaseService {
            host: fields.data("host")?,
            port: fields.data("port")?,
        })
    }
}

#[derive(Debug)]
struct UserService {
    db: Arc<DatabaseService>,
    cache_enabled: bool,
}
impl Construct for UserService {
    fn construct(fields: &mut Fields) -> Result<Self, DynError> {
        Ok(UserService {
            db: fields.instance("db")?,
            cache_enabled: fields.data("cache_enabled")?,
        })
    }
}
