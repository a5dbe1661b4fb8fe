pub fn user_fixture() -> &'static str {
    return r#"{"_id":"u-1","username":"ada","email":"ada@example.com"}"#;
}

pub fn auth_response_fixture() -> &'static str {
    return r#"
{
  "access_token": "token123",
  "token_type": "bearer",
  "user": {"_id": "u-1", "username": "ada", "email": "ada@example.com"}
}
"#
    .trim();
}

/// A session waiting on plan approval with two historical updates.
pub fn session_fixture() -> &'static str {
    return r#"
{
  "_id": "s-1",
  "user_id": "u-1",
  "topic": "Impact of artificial intelligence on healthcare diagnostics",
  "status": "awaiting_approval",
  "plan": {
    "sections": ["Introduction", "Current diagnostic tools", "Outlook"],
    "research_questions": ["Where is AI used today?"],
    "estimated_sources": 12
  },
  "plan_approved": false,
  "research_notes": [],
  "sections": [],
  "agent_updates": [
    {
      "agent": "manager",
      "action": "planning",
      "details": {"message": "Creating research plan"},
      "timestamp": "2024-03-01T10:00:00.000000"
    },
    {
      "agent": "manager",
      "action": "plan_created",
      "details": {
        "message": "Research plan ready for approval",
        "plan": {"sections": ["Introduction", "Current diagnostic tools", "Outlook"], "estimated_sources": 12}
      },
      "timestamp": "2024-03-01T10:00:05.000000"
    }
  ],
  "created_at": "2024-03-01T10:00:00.000000",
  "updated_at": "2024-03-01T10:00:05.000000"
}
"#
    .trim();
}

pub fn sessions_list_fixture() -> &'static str {
    return r#"
[
  {
    "_id": "s-2",
    "topic": "Climate change effects on global agriculture",
    "status": "completed",
    "plan_approved": true,
    "agent_updates": [],
    "cloudinary_url": "https://res.cloudinary.com/demo/raw/upload/report.pdf",
    "created_at": "2024-03-02T09:30:00"
  },
  {
    "_id": "s-1",
    "topic": "Impact of artificial intelligence on healthcare diagnostics",
    "status": "researching",
    "plan_approved": true,
    "agent_updates": [],
    "created_at": "2024-03-01T10:00:00"
  }
]
"#
    .trim();
}
