use crate::types::{BatteryBin, ChatReply, WasteFee};

const BATTERY_KEYWORD: &str = "건전지 수거함";
const FEE_KEYWORD: &str = "수수료";

const DEFAULT_REGION: &str = "관악구";
const DEFAULT_ITEM: &str = "장롱";

pub const HELP_MESSAGE: &str = "안녕하세요! 재활용 분류 챗봇입니다. 다음과 같은 질문을 할 수 있습니다:\n\n1. \"[주소] 건전지 수거함\" - 주변 건전지 수거함 위치 검색\n2. \"[지역] [품목] 수수료\" - 대형폐기물 수수료 조회";

/// Suggested queries shown when the chat opens
pub const EXAMPLE_QUERIES: [&str; 2] = ["신림로 430 건전지 수거함", "관악구 장롱 수수료"];

// (specification, display fee, fee in won)
const FEE_TABLE: [(&str, &str, u32); 4] = [
    ("1명용", "6,000원", 6_000),
    ("2명용", "8,000원", 8_000),
    ("3명용", "10,000원", 10_000),
    ("4명용 이상", "15,000원", 15_000),
];

/// One keyword rule: a predicate and the reply it produces
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub respond: fn(&str) -> ChatReply,
}

/// Checked in order; the first match wins
pub static RULES: [Rule; 2] = [
    Rule {
        name: "battery_bins",
        matches: asks_for_battery_bins,
        respond: battery_bins,
    },
    Rule {
        name: "waste_fees",
        matches: asks_for_fees,
        respond: waste_fees,
    },
];

pub static DEFAULT: Rule = Rule {
    name: "help",
    matches: always,
    respond: help,
};

fn asks_for_battery_bins(input: &str) -> bool {
    input.contains(BATTERY_KEYWORD)
}

fn asks_for_fees(input: &str) -> bool {
    input.contains(FEE_KEYWORD)
}

fn always(_input: &str) -> bool {
    true
}

pub fn respond(input: &str) -> ChatReply {
    let rule = RULES
        .iter()
        .find(|rule| (rule.matches)(input))
        .unwrap_or(&DEFAULT);
    tracing::debug!("💬 Chat rule '{}' matched", rule.name);
    (rule.respond)(input)
}

fn battery_bins(input: &str) -> ChatReply {
    let address = input.replacen(BATTERY_KEYWORD, "", 1).trim().to_string();
    let near = |fallback: &str| {
        if address.is_empty() {
            fallback.to_string()
        } else {
            format!("{} 인근", address)
        }
    };

    let results = vec![
        BatteryBin {
            address: if address.is_empty() {
                "신림로 430".to_string()
            } else {
                address.clone()
            },
            location: "관악구청 1층 로비".to_string(),
            opening_hours: "09:00-18:00".to_string(),
        },
        BatteryBin {
            address: near("신림로 3"),
            location: "신림역 지하상가 입구".to_string(),
            opening_hours: "06:00-24:00".to_string(),
        },
        BatteryBin {
            address: near("신림동 1423-15"),
            location: "신림동주민센터 앞".to_string(),
            opening_hours: "24시간".to_string(),
        },
    ];

    ChatReply::BatteryBins {
        query: input.to_string(),
        results,
    }
}

fn waste_fees(input: &str) -> ChatReply {
    let remainder = input.replacen(FEE_KEYWORD, "", 1);
    let mut parts = remainder.split_whitespace();
    let region = parts.next().unwrap_or(DEFAULT_REGION).to_string();
    let item = parts.next().unwrap_or(DEFAULT_ITEM).to_string();

    let results = FEE_TABLE
        .iter()
        .map(|(specification, fee, fee_won)| WasteFee {
            region: region.clone(),
            item: item.clone(),
            specification: specification.to_string(),
            fee: fee.to_string(),
            fee_won: *fee_won,
        })
        .collect();

    ChatReply::WasteFees {
        query: input.to_string(),
        results,
    }
}

fn help(input: &str) -> ChatReply {
    ChatReply::General {
        query: input.to_string(),
        message: HELP_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_query_uses_the_address() {
        let ChatReply::BatteryBins { results, query } = respond("신림로 430 건전지 수거함") else {
            panic!("expected battery bins");
        };
        assert_eq!(query, "신림로 430 건전지 수거함");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].address, "신림로 430");
        assert_eq!(results[1].address, "신림로 430 인근");
        assert_eq!(results[2].opening_hours, "24시간");
    }

    #[test]
    fn bare_battery_query_falls_back_to_defaults() {
        let ChatReply::BatteryBins { results, .. } = respond("건전지 수거함") else {
            panic!("expected battery bins");
        };
        let addresses: Vec<&str> = results.iter().map(|b| b.address.as_str()).collect();
        assert_eq!(addresses, vec!["신림로 430", "신림로 3", "신림동 1423-15"]);
    }

    #[test]
    fn fee_query_parses_region_and_item() {
        let ChatReply::WasteFees { results, .. } = respond("마포구 소파 수수료") else {
            panic!("expected fees");
        };
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|f| f.region == "마포구" && f.item == "소파"));
        assert_eq!(results[3].specification, "4명용 이상");
        assert_eq!(results[3].fee, "15,000원");
        assert_eq!(results[0].fee_won, 6_000);
    }

    #[test]
    fn fee_defaults() {
        let ChatReply::WasteFees { results, .. } = respond("수수료") else {
            panic!("expected fees");
        };
        assert_eq!(results[0].region, "관악구");
        assert_eq!(results[0].item, "장롱");

        let ChatReply::WasteFees { results, .. } = respond("강남구 수수료") else {
            panic!("expected fees");
        };
        assert_eq!((results[0].region.as_str(), results[0].item.as_str()), ("강남구", "장롱"));
    }

    #[test]
    fn battery_rule_wins_over_fee_rule() {
        assert!(matches!(
            respond("건전지 수거함 수수료"),
            ChatReply::BatteryBins { .. }
        ));
    }

    #[test]
    fn anything_else_gets_help() {
        let reply = respond("안녕하세요");
        assert_eq!(
            reply,
            ChatReply::General {
                query: "안녕하세요".to_string(),
                message: HELP_MESSAGE.to_string(),
            }
        );
        assert!(HELP_MESSAGE.contains("[주소] 건전지 수거함"));
        assert!(HELP_MESSAGE.contains("[지역] [품목] 수수료"));
    }

    #[test]
    fn example_queries_hit_their_rules() {
        assert!(matches!(respond(EXAMPLE_QUERIES[0]), ChatReply::BatteryBins { .. }));
        assert!(matches!(respond(EXAMPLE_QUERIES[1]), ChatReply::WasteFees { .. }));
    }

    #[test]
    fn reply_json_is_tagged() {
        let json = serde_json::to_value(respond("관악구 장롱 수수료")).unwrap();
        assert_eq!(json["type"], "waste_fees");
        assert_eq!(json["query"], "관악구 장롱 수수료");
    }
}
