//! `medctx context`: aggregate context for one query.

use medctx_aggregator::FetchRequest;
use std::path::Path;

pub struct ContextArgs {
    pub subject: String,
    pub query: String,
    pub conversation: Option<String>,
    pub only: Vec<String>,
    pub budget: Option<usize>,
}

impl From<ContextArgs> for FetchRequest {
    fn from(args: ContextArgs) -> Self {
        let mut request = FetchRequest::new(args.subject, args.query);
        request.conversation_id = args.conversation;
        request.token_budget = args.budget;
        if !args.only.is_empty() {
            request = request.only(args.only);
        }
        request
    }
}

pub async fn run(path: Option<&Path>, args: ContextArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;
    let aggregator = super::build_aggregator(&config).await?;
    let context = aggregator.fetch(args.into()).await?;
    super::print_json(context.as_ref())
}
