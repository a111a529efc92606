//! `opsclaw tools`: Show the tool catalogue, as the model sees it.

use opsclaw_tools::Toolkit;

pub fn run(toolkits: Vec<Toolkit>) {
    let toolkits = if toolkits.is_empty() {
        Toolkit::ALL.to_vec()
    } else {
        toolkits
    };

    for toolkit in toolkits {
        let tools = toolkit.describe();
        println!("{toolkit} ({} tools)", tools.len());
        for tool in tools {
            println!("  {:<24} {}", tool.name, tool.description);
        }
        println!();
    }
}
