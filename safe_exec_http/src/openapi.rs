//! OpenAPI description and Swagger UI page for the service's endpoints.

use safe_exec_common::ErrorCode;
use serde_json::{Value, json};

/// Swagger UI page that loads `/openapi.json`.
pub const DOCS_HTML: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <title>safe_exec API Docs</title>
    <link rel="stylesheet"
      href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css">
  </head>
  <body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"></script>
    <script>
      window.onload = () => {
        window.ui = SwaggerUIBundle({
          url: '/openapi.json',
          dom_id: '#swagger-ui',
          deepLinking: true,
          presets: [SwaggerUIBundle.presets.apis],
          layout: "BaseLayout"
        });
      };
    </script>
  </body>
</html>
"#;

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorEnvelope" }
            }
        }
    })
}

/// OpenAPI 3.0.3 document for `/health` and `/execute`.
pub fn openapi_document() -> Value {
    let codes: Vec<&str> = ErrorCode::ALL.iter().map(|code| code.as_str()).collect();

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Safe Python Execution Service",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Execute untrusted Python snippets with strict limits. Endpoints: /health, /execute"
        },
        "servers": [{ "url": "/" }],
        "paths": {
            "/health": {
                "get": {
                    "summary": "Health check",
                    "responses": {
                        "200": {
                            "description": "Service OK",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": { "ok": { "type": "boolean" } }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "/execute": {
                "post": {
                    "summary": "Execute a Python script defining main()",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/ExecuteRequest" }
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Execution result",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/ExecuteSuccess" }
                                }
                            }
                        },
                        "400": error_response("Invalid script or failure inside the script"),
                        "408": error_response("Execution timed out"),
                        "415": error_response("Content-Type is not application/json"),
                        "500": error_response("Internal error")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "ExecuteRequest": {
                    "type": "object",
                    "required": ["script"],
                    "properties": {
                        "script": {
                            "type": "string",
                            "description": "Python source string that defines a callable main()"
                        }
                    },
                    "additionalProperties": false
                },
                "ExecuteSuccess": {
                    "type": "object",
                    "properties": {
                        "result": { "description": "JSON-serializable return value from main()" },
                        "stdout": { "type": "string" }
                    },
                    "required": ["result", "stdout"],
                    "additionalProperties": false
                },
                "ErrorEnvelope": {
                    "type": "object",
                    "properties": {
                        "error": {
                            "type": "object",
                            "properties": {
                                "code": { "type": "string", "enum": codes },
                                "message": { "type": "string" },
                                "details": { "type": "object", "additionalProperties": true }
                            },
                            "required": ["code", "message"],
                            "additionalProperties": false
                        }
                    },
                    "required": ["error"],
                    "additionalProperties": false
                }
            }
        }
    })
}
