#![allow(dead_code)]

use apiql::prelude::*;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub body: String,
}

impl Object for Post {
    fn type_name(&self) -> &'static str {
        "Post"
    }

    fn field(&self, name: &str, _args: &[Value]) -> Option<Value> {
        match name {
            "id" => Some(self.id.into()),
            "title" => Some(self.title.as_str().into()),
            "body" => Some(self.body.as_str().into()),
            _ => None,
        }
    }

    fn id(&self) -> Option<Value> {
        Some(self.id.into())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub posts: Vec<Post>,
}

impl Object for User {
    fn type_name(&self) -> &'static str {
        "User"
    }

    fn field(&self, name: &str, _args: &[Value]) -> Option<Value> {
        match name {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "email" => Some(self.email.as_str().into()),
            "posts" => Some(self.posts.iter().cloned().map(Value::object).collect::<Vec<_>>().into()),
            _ => None,
        }
    }

    fn id(&self) -> Option<Value> {
        Some(self.id.into())
    }
}

pub fn ada() -> User {
    User {
        id: 7,
        name: "Ada".into(),
        email: "ada@example.com".into(),
        posts: vec![
            Post {
                id: 1,
                title: "Notes".into(),
                body: "On the analytical engine".into(),
            },
            Post {
                id: 2,
                title: "Sketch".into(),
                body: "Of the engine".into(),
            },
        ],
    }
}

pub fn people() -> Vec<User> {
    ["Ada", "Grace", "Edsger"]
        .into_iter()
        .enumerate()
        .map(|(i, name)| User {
            id: i as i64 + 1,
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            posts: Vec::new(),
        })
        .collect()
}

pub fn entities() -> EntityRegistry {
    let record = EntityDescriptor::new("Record").attributes(["id"]);
    let mut registry = EntityRegistry::new();
    registry
        .register::<User>(
            EntityDescriptor::new("User")
                .attributes(["name", "email", "posts"])
                .resolve("initials", |entity, _args| {
                    let user = entity
                        .object_as::<User>()
                        .ok_or_else(|| ApiqlError::Render("not a user".into()))?;
                    Ok(user.name.chars().take(1).collect::<String>().into())
                })
                .map_params(|mut params| {
                    params.shift_remove("id");
                    Ok(params)
                })
                .extends(&record),
        )
        .register::<Post>(
            EntityDescriptor::new("Post")
                .attributes(["title"])
                .extends(&record),
        );
    registry
}

/// In-memory user table. Clones share the same rows.
#[derive(Clone, Default)]
pub struct Users {
    rows: Arc<Mutex<Vec<User>>>,
}

impl Users {
    pub fn new(rows: Vec<User>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.rows.lock().unwrap().iter().map(|u| u.name.clone()).collect()
    }
}

fn text(params: &Params, name: &str) -> Option<String> {
    params.get(name).and_then(Value::as_str).map(str::to_string)
}

impl Repository for Users {
    fn count(&self) -> ApiqlResult<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    fn list(&self, range: Option<(u64, u64)>, _hints: &EagerLoad) -> ApiqlResult<Vec<Value>> {
        let rows = self.rows.lock().unwrap();
        let (offset, limit) = range.unwrap_or((0, rows.len() as u64));
        Ok(rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .map(Value::object)
            .collect())
    }

    fn find(&self, id: &Value, _hints: &EagerLoad) -> ApiqlResult<Option<Value>> {
        let id = id.as_i64();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|u| Some(u.id) == id)
            .cloned()
            .map(Value::object))
    }

    fn create(&self, params: Params) -> ApiqlResult<Value> {
        let mut rows = self.rows.lock().unwrap();
        let user = User {
            id: rows.iter().map(|u| u.id).max().unwrap_or_default() + 1,
            name: text(&params, "name").unwrap_or_default(),
            email: text(&params, "email").unwrap_or_default(),
            posts: Vec::new(),
        };
        rows.push(user.clone());
        Ok(Value::object(user))
    }

    fn update(&self, id: &Value, params: Params) -> ApiqlResult<Value> {
        let mut rows = self.rows.lock().unwrap();
        let user = rows
            .iter_mut()
            .find(|u| Some(u.id) == id.as_i64())
            .ok_or_else(|| ApiqlError::Operation("user not found".into()))?;
        if let Some(name) = text(&params, "name") {
            user.name = name;
        }
        if let Some(email) = text(&params, "email") {
            user.email = email;
        }
        Ok(Value::object(user.clone()))
    }

    fn destroy(&self, id: &Value) -> ApiqlResult<Value> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|u| Some(u.id) != id.as_i64());
        Ok((rows.len() < before).into())
    }
}

/// Root binding used by the scenarios.
pub fn api(users: &Users, entities: &EntityRegistry) -> Api {
    let mut api = Api::new();
    api.operation("name", |_inv| Ok("Ada".into()))
        .operation("user", |_inv| Ok(Value::object(ada())))
        .operation("people", |_inv| {
            Ok(people().into_iter().map(Value::object).collect::<Vec<_>>().into())
        })
        .operation("whoami", |inv| {
            Ok(inv.context().get("current_user").cloned().unwrap_or_default())
        });

    let mut admin = Api::new();
    admin.model(
        Model::new("User", "user", "users", users.clone())
            .hooks_from(entities.get::<User>().expect("user entity"))
            .page_size(2),
    );
    api.mount("admin", admin);
    api
}

pub fn service(users: &Users, config: ApiqlConfig) -> Service {
    let entities = entities();
    let api = api(users, &entities);
    Service::new(api, entities, config)
}
