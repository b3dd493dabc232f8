use crate::session::{SessionState, TodoItem};

/// Replace the session todo list and render the confirmation.
pub fn write_todos(session: &SessionState, todos: Vec<TodoItem>) -> String {
    let mut output = format!("Updated {} todos", todos.len());
    for todo in &todos {
        output.push('\n');
        output.push_str(todo.status.icon());
        output.push(' ');
        output.push_str(&todo.content);
    }
    session.replace_todos(todos);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TodoStatus;

    #[test]
    fn summary_lists_icons() {
        let session = SessionState::detached();
        let todos = vec![
            TodoItem {
                content: "Write code".into(),
                status: TodoStatus::Completed,
                active_form: "Writing code".into(),
            },
            TodoItem {
                content: "Run tests".into(),
                status: TodoStatus::InProgress,
                active_form: "Running tests".into(),
            },
            TodoItem {
                content: "Ship".into(),
                status: TodoStatus::Pending,
                active_form: String::new(),
            },
        ];

        let out = write_todos(&session, todos);
        assert_eq!(out, "Updated 3 todos\n✅ Write code\n🔄 Run tests\n⏳ Ship");
        assert_eq!(session.todos().len(), 3);
    }

    #[test]
    fn empty_list_clears() {
        let session = SessionState::detached();
        assert_eq!(write_todos(&session, vec![]), "Updated 0 todos");
        assert!(session.todos().is_empty());
    }
}
