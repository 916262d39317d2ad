use super::{fetch_json, segment, send, ApiClient, ClientError};
use crate::api::todos::{ReassignRequest, UpdateStatusRequest};
use crate::tables::{Todo, TodoStatus};
use crate::todos::NewTodo;
use crate::TODOS_API;

impl ApiClient {
    pub async fn fetch_todos(
        &self,
        include_subordinates: bool,
        pending: bool,
    ) -> Result<Vec<Todo>, ClientError> {
        fetch_json(
            self.get(TODOS_API).query(&[
                ("include_subordinates", include_subordinates),
                ("pending", pending),
            ]),
            "todos",
        )
        .await
    }

    pub async fn fetch_todo(&self, id: &str) -> Result<Todo, ClientError> {
        let path = format!("{TODOS_API}/{}", segment(id));
        fetch_json(self.get(&path), &format!("todo {id}")).await
    }

    pub async fn create_todo(&self, todo: &NewTodo) -> Result<Todo, ClientError> {
        fetch_json(self.post(TODOS_API).json(todo), "todos").await
    }

    pub async fn update_todo_status(
        &self,
        id: &str,
        status: TodoStatus,
    ) -> Result<Todo, ClientError> {
        let path = format!("{TODOS_API}/{}/status", segment(id));
        fetch_json(
            self.put(&path).json(&UpdateStatusRequest { status }),
            &format!("todo {id}"),
        )
        .await
    }

    pub async fn reassign_todo(&self, id: &str, assignee_id: &str) -> Result<Todo, ClientError> {
        let path = format!("{TODOS_API}/{}/assignee", segment(id));
        let payload = ReassignRequest {
            assignee_id: assignee_id.to_string(),
        };
        fetch_json(self.put(&path).json(&payload), &format!("todo {id}")).await
    }

    pub async fn delete_todo(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("{TODOS_API}/{}", segment(id));
        send(self.delete(&path), &format!("todo {id}")).await?;
        Ok(())
    }
}
