//! Handlers bundled with the bootstrap binary
//!
//! One per calling convention. Select one with `_HANDLER=<module>.<name>`,
//! e.g. `_HANDLER=bootstrap.greet`.

use bootstrap_runtime::{BoxError, Completion, Context, HandlerRegistry, JsonObject};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct GreetRequest {
    pub name: String,
    #[serde(default)]
    pub greeting: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GreetResponse {
    pub message: String,
    pub request_id: String,
}

/// Register every bundled handler
pub fn register(registry: &mut HandlerRegistry) {
    registry
        .register_sync("echo", echo)
        .register_async("echoAsync", echo_async)
        .register_typed("greet", greet)
        .register_typed_async("greetAsync", greet_async);
}

/// Returns the input object with the request id added
fn echo(mut input: JsonObject, context: &Context) -> Result<JsonObject, BoxError> {
    input.insert(
        "requestId".to_string(),
        Value::String(context.aws_request_id.clone()),
    );
    Ok(input)
}

fn echo_async(input: JsonObject, context: Context, done: Completion<JsonObject>) {
    tokio::spawn(async move {
        match echo(input, &context) {
            Ok(output) => done.complete(output),
            Err(e) => done.fail(e),
        }
    });
}

fn greet(input: GreetRequest, context: &Context) -> Result<GreetResponse, BoxError> {
    if input.name.trim().is_empty() {
        return Err("name must not be empty".into());
    }

    let greeting = input.greeting.as_deref().unwrap_or("Hello");
    Ok(GreetResponse {
        message: format!("{greeting}, {}!", input.name),
        request_id: context.aws_request_id.clone(),
    })
}

fn greet_async(input: GreetRequest, context: Context, done: Completion<GreetResponse>) {
    std::thread::spawn(move || match greet(input, &context) {
        Ok(output) => done.complete(output),
        Err(e) => done.fail(e),
    });
}
