//! `banshare list` - page through one registry list.

use anyhow::Result;
use banshare_core::{PageRequest, PageResponse};

use super::Context;
use crate::cli::args::ListArgs;
use crate::output;

pub async fn execute(ctx: Context, args: ListArgs) -> Result<()> {
    let client = ctx.client()?;
    let mut request = PageRequest {
        page: args.page,
        page_size: args.page_size,
        search_ip: args.search.clone(),
    };

    let response = if args.all {
        let mut items = Vec::new();
        loop {
            let page = client.list().page(args.status, &request).await?;
            let fetched = page.items.len();
            items.extend(page.items);
            if fetched == 0 || items.len() as u64 >= page.total {
                break;
            }
            request = request.next();
        }
        let total = items.len() as u64;
        PageResponse { items, total }
    } else {
        client.list().page(args.status, &request).await?
    };

    if ctx.json {
        output::print_json(&response)?;
    } else {
        print!("{}", output::render_records(&response.items));
        println!("{} of {} {} record(s)", response.items.len(), response.total, args.status);
    }
    Ok(())
}
