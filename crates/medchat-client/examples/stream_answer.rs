use medchat_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    medchat_client::init_observability("info");

    let client = ChatClient::builder()
        .config(ClientConfig::from_env()?)
        .build()?;

    let request = StreamRequest::new("What are common symptoms of dehydration?", None)?;
    let mut stream = client.start_stream(request);

    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Token { delta, .. } => print!("{delta}"),
            StreamEvent::Done { .. } => println!(),
            StreamEvent::Error { error, .. } => eprintln!("{}", error.user_message()),
        }
    }

    let answer = stream.finish().await?;
    if let Some(advisory) = answer.advisory() {
        eprintln!("{advisory}");
    }
    Ok(())
}
