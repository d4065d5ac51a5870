// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print one JSON document per line"),
    )
}

fn opt(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help)
}

fn req(name: &'static str, help: &'static str) -> Arg {
    opt(name, help).required(true)
}

pub fn build_cli() -> Command {
    Command::new("fintally")
        .version(clap::crate_version!())
        .about("Statement import, running balances, and multi-currency budgets")
        .subcommand_required(false)
        .subcommand(Command::new("init").about("Create the database if needed"))
        .subcommand(
            Command::new("config")
                .about("Show or change settings")
                .subcommand(Command::new("show"))
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("key").required(true))
                        .arg(Arg::new("value").required(true)),
                ),
        )
        .subcommand(
            Command::new("asset")
                .about("Manage assets (accounts holding a running balance)")
                .subcommand(
                    Command::new("add")
                        .arg(req("name", "Unique asset name"))
                        .arg(opt("kind", "Asset kind, e.g. bank, cash, card").default_value("bank"))
                        .arg(req("currency", "ISO 4217 code"))
                        .arg(opt("initial", "Opening balance").default_value("0"))
                        .arg(opt("family", "Family id; makes the asset family-owned")),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(json_flags(
                    Command::new("show").arg(Arg::new("name").required(true)),
                ))
                .subcommand(Command::new("rm").arg(Arg::new("name").required(true)))
                .subcommand(
                    Command::new("revalue")
                        .about("Set the balance directly (valuation entry)")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("amount").required(true).allow_hyphen_values(true)),
                ),
        )
        .subcommand(
            Command::new("tx")
                .about("Manual transactions")
                .subcommand(
                    Command::new("add")
                        .arg(req("asset", "Asset name"))
                        .arg(req("type", "INCOME, EXPENSE or TRANSFER"))
                        .arg(req("amount", "Non-negative amount"))
                        .arg(req("date", "YYYY-MM-DD"))
                        .arg(opt("category", "Category").default_value("Uncategorized"))
                        .arg(opt("description", "Description"))
                        .arg(opt("currency", "Defaults to the asset currency")),
                )
                .subcommand(
                    Command::new("edit")
                        .arg(
                            Arg::new("id")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(opt("asset", "Move to another asset"))
                        .arg(opt("type", "INCOME, EXPENSE or TRANSFER"))
                        .arg(opt("amount", "Non-negative amount"))
                        .arg(opt("date", "YYYY-MM-DD"))
                        .arg(opt("category", "Category"))
                        .arg(opt("description", "Description"))
                        .arg(opt("currency", "Currency")),
                )
                .subcommand(
                    Command::new("rm").arg(
                        Arg::new("id")
                            .required(true)
                            .value_parser(value_parser!(i64)),
                    ),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(opt("asset", "Only this asset"))
                        .arg(opt("limit", "Max rows").value_parser(value_parser!(usize))),
                )),
        )
        .subcommand(
            Command::new("import")
                .about("Import bank statements (CSV or spreadsheet)")
                .subcommand(json_flags(
                    Command::new("preview")
                        .arg(req("path", "Statement file"))
                        .arg(opt("sheet", "Sheet name for workbooks"))
                        .arg(
                            opt("limit", "Sample rows")
                                .value_parser(value_parser!(usize))
                                .default_value("10"),
                        ),
                ))
                .subcommand(json_flags(
                    Command::new("commit")
                        .arg(req("path", "Statement file"))
                        .arg(
                            opt("request", "JSON commit request file")
                                .conflicts_with_all(["asset", "date-col", "description-col", "amount-col"]),
                        )
                        .arg(opt("asset", "Target asset name"))
                        .arg(opt("date-col", "Header of the date column"))
                        .arg(opt("description-col", "Header of the description column"))
                        .arg(opt("amount-col", "Header of the amount column"))
                        .arg(opt("currency-col", "Header of the currency column"))
                        .arg(opt("category-col", "Header of the category column"))
                        .arg(opt("type-col", "Header of the credit/debit column"))
                        .arg(opt("date-format", "Date format, e.g. %d/%m/%Y or DD/MM/YYYY"))
                        .arg(opt("sheet", "Sheet name for workbooks"))
                        .arg(
                            Arg::new("skip-duplicates")
                                .long("skip-duplicates")
                                .action(ArgAction::SetTrue),
                        ),
                ))
                .subcommand(json_flags(
                    Command::new("history")
                        .arg(opt("asset", "Only this asset"))
                        .arg(
                            opt("limit", "Max rows")
                                .value_parser(value_parser!(usize))
                                .default_value("20"),
                        ),
                ))
                .subcommand(json_flags(
                    Command::new("show").arg(
                        Arg::new("id")
                            .required(true)
                            .value_parser(value_parser!(i64)),
                    ),
                )),
        )
        .subcommand(
            Command::new("fx")
                .about("Exchange rates")
                .subcommand(json_flags(
                    Command::new("rates").arg(Arg::new("base").required(true)),
                ))
                .subcommand(
                    Command::new("convert")
                        .arg(req("amount", "Amount").allow_hyphen_values(true))
                        .arg(req("from", "Source currency"))
                        .arg(opt("to", "Target currency; defaults to reporting_currency")),
                )
                .subcommand(Command::new("cached").arg(opt("base", "Only this base")))
                .subcommand(
                    Command::new("purge").arg(
                        opt("keep-days", "Keep this many most recent days")
                            .value_parser(value_parser!(u32))
                            .default_value("7"),
                    ),
                ),
        )
        .subcommand(
            Command::new("budget")
                .about("Multi-currency budgets")
                .subcommand(
                    Command::new("add")
                        .arg(req("name", "Budget name"))
                        .arg(opt("currency", "Reporting currency; defaults to reporting_currency"))
                        .arg(opt("income", "Income amount").default_value("0"))
                        .arg(opt("income-currency", "Defaults to the reporting currency")),
                )
                .subcommand(
                    Command::new("item")
                        .arg(req("budget", "Budget name"))
                        .arg(req("category", "Category"))
                        .arg(req("amount", "Amount in native currency"))
                        .arg(req("currency", "Native currency")),
                )
                .subcommand(Command::new("list"))
                .subcommand(json_flags(
                    Command::new("summary").arg(Arg::new("name").required(true)),
                )),
        )
        .subcommand(
            Command::new("rules")
                .about("Regex categorisation rules for imports")
                .subcommand(
                    Command::new("add")
                        .arg(req("pattern", "Regex matched against the description"))
                        .arg(req("category", "Category to assign")),
                )
                .subcommand(Command::new("list"))
                .subcommand(Command::new("rm").arg(Arg::new("id").required(true))),
        )
        .subcommand(Command::new("doctor").about("Check balances and import records"))
}
