//! Brokerage endpoint registry
//!
//! Every remote operation differs only in opcode, URL path, parameter set
//! and response schema, so the per-endpoint wrappers collapse into one
//! descriptor table consumed by the generic invoker and the normalizer.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Opcode of the OAuth token endpoint. Handled by the credential manager,
/// not by the generic invoker.
pub const AUTH_API_ID: &str = "au10001";
pub const AUTH_PATH: &str = "/oauth2/token";

/// How a normalized payload should be shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Flat per-stock snapshot (scalar fields only).
    Quote,
    /// Ranked list of stocks.
    Ranking,
    /// Institutional / foreign flow rows.
    Flow,
    /// Sector or theme rows.
    Sector,
    /// Account evaluation snapshot.
    Account,
    /// OHLCV candle rows.
    Chart,
    /// Anything else: renamed fields passed through as a table.
    Table,
}

/// Static description of one brokerage operation.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    /// Opcode carried in the `api-id` request header.
    pub api_id: &'static str,
    /// URL path under the brokerage base URL.
    pub path: &'static str,
    /// Human-readable operation name for logs and reports.
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// Response field holding the row array, when the endpoint returns one.
    pub rows_field: Option<&'static str>,
    /// The remote does not support limiting this endpoint's row array; the
    /// invoker truncates it client-side.
    pub cap_rows: bool,
    /// Abbreviated remote field name → stable internal name.
    pub renames: &'static [(&'static str, &'static str)],
    pub shape: PayloadShape,
}

/// Shared row vocabulary of the ranking endpoints.
const RANKING_RENAMES: &[(&str, &str)] = &[
    ("stk_cd", "code"),
    ("stk_nm", "name"),
    ("cur_prc", "current_price"),
    ("pred_pre_sig", "change_sign"),
    ("pred_pre", "change"),
    ("flu_rt", "change_rate"),
    ("trde_qty", "volume"),
    ("now_trde_qty", "current_volume"),
    ("prev_trde_qty", "previous_volume"),
    ("trde_prica", "trading_value"),
    ("sdnin_qty", "surge_volume"),
    ("sdnin_rt", "surge_rate"),
];

/// Flow (institutional / foreign) row vocabulary.
const FLOW_RENAMES: &[(&str, &str)] = &[
    ("stk_cd", "code"),
    ("stk_nm", "name"),
    ("cur_prc", "current_price"),
    ("flu_rt", "change_rate"),
    ("orgn_netprps", "institution_net_buy"),
    ("frgnr_netprps", "foreign_net_buy"),
    ("netprps_qty", "net_buy_volume"),
    ("netprps_amt", "net_buy_amount"),
    ("prps_qty", "holding_volume"),
];

/// Sector / theme row vocabulary.
const SECTOR_RENAMES: &[(&str, &str)] = &[
    ("inds_cd", "sector_code"),
    ("inds_nm", "sector_name"),
    ("thema_grp_cd", "theme_code"),
    ("thema_nm", "theme_name"),
    ("stk_cd", "code"),
    ("stk_nm", "name"),
    ("cur_prc", "current_price"),
    ("flu_rt", "change_rate"),
    ("trde_qty", "volume"),
    ("flo_stk_num", "component_count"),
];

/// Full scalar rename table of the stock basic info operation, recovered
/// from the upstream field mapping.
const STOCK_INFO_RENAMES: &[(&str, &str)] = &[
    ("stk_cd", "code"),
    ("stk_nm", "name"),
    ("setl_mm", "settlement_month"),
    ("fav", "face_value"),
    ("cap", "capital"),
    ("flo_stk", "listed_shares"),
    ("crd_rt", "credit_ratio"),
    ("oyr_hgst", "year_high"),
    ("oyr_lwst", "year_low"),
    ("mac", "market_cap"),
    ("mac_wght", "market_cap_weight"),
    ("for_exh_rt", "foreign_exhaustion_rate"),
    ("repl_pric", "replacement_price"),
    ("per", "per"),
    ("eps", "eps"),
    ("roe", "roe"),
    ("pbr", "pbr"),
    ("ev", "ev"),
    ("bps", "bps"),
    ("sale_amt", "sales_amount"),
    ("bus_pro", "operating_profit"),
    ("cup_nga", "net_income"),
    ("250hgst", "high_250"),
    ("250lwst", "low_250"),
    ("high_pric", "high_price"),
    ("open_pric", "open_price"),
    ("low_pric", "low_price"),
    ("upl_pric", "upper_limit_price"),
    ("lst_pric", "lower_limit_price"),
    ("base_pric", "base_price"),
    ("exp_cntr_pric", "expected_contract_price"),
    ("exp_cntr_qty", "expected_contract_quantity"),
    ("250hgst_pric_dt", "high_250_date"),
    ("250hgst_pric_pre_rt", "high_250_ratio"),
    ("250lwst_pric_dt", "low_250_date"),
    ("250lwst_pric_pre_rt", "low_250_ratio"),
    ("cur_prc", "current_price"),
    ("pre_sig", "change_sign"),
    ("pred_pre", "change"),
    ("flu_rt", "change_rate"),
    ("trde_qty", "volume"),
    ("trde_pre", "volume_change"),
    ("fav_unit", "face_value_unit"),
    ("dstr_stk", "distributed_shares"),
    ("dstr_rt", "distribution_ratio"),
];

const ACCOUNT_RENAMES: &[(&str, &str)] = &[
    ("entr", "deposit"),
    ("d2_entra", "deposit_d2"),
    ("tot_est_amt", "total_value"),
    ("tot_pur_amt", "total_purchase_amount"),
    ("lspft_amt", "realized_profit"),
    ("lspft_rt", "realized_profit_rate"),
    ("stk_cd", "code"),
    ("stk_nm", "name"),
    ("rmnd_qty", "holding_volume"),
    ("avg_prc", "average_price"),
    ("cur_prc", "current_price"),
    ("evlt_amt", "evaluation_amount"),
    ("pl_amt", "profit_loss"),
    ("pl_rt", "profit_loss_rate"),
];

const CHART_RENAMES: &[(&str, &str)] = &[
    ("dt", "date"),
    ("cntr_tm", "time"),
    ("open_pric", "open"),
    ("high_pric", "high"),
    ("low_pric", "low"),
    ("cur_prc", "close"),
    ("trde_qty", "volume"),
    ("trde_prica", "trading_value"),
];

const SHORT_SELLING_RENAMES: &[(&str, &str)] = &[
    ("dt", "date"),
    ("shrts_qty", "short_volume"),
    ("shrts_amt", "short_amount"),
    ("shrts_wght", "short_weight"),
    ("cur_prc", "close"),
    ("flu_rt", "change_rate"),
    ("trde_qty", "volume"),
];

const ENDPOINTS: &[EndpointDescriptor] = &[
    // ---- account ----
    EndpointDescriptor {
        api_id: "kt00004",
        path: "/api/dostk/acnt",
        name: "account_evaluation",
        required: &["qry_tp", "dmst_stex_tp"],
        optional: &[],
        rows_field: Some("stk_acnt_evlt_prst"),
        cap_rows: false,
        renames: ACCOUNT_RENAMES,
        shape: PayloadShape::Account,
    },
    // ---- single stock ----
    EndpointDescriptor {
        api_id: "ka10001",
        path: "/api/dostk/stkinfo",
        name: "stock_basic_info",
        required: &["stk_cd"],
        optional: &[],
        rows_field: None,
        cap_rows: false,
        renames: STOCK_INFO_RENAMES,
        shape: PayloadShape::Quote,
    },
    EndpointDescriptor {
        api_id: "ka10081",
        path: "/api/dostk/chart",
        name: "daily_chart",
        required: &["stk_cd", "base_dt", "upd_stkpc_tp"],
        optional: &[],
        rows_field: Some("stk_dt_pole_chart_qry"),
        cap_rows: false,
        renames: CHART_RENAMES,
        shape: PayloadShape::Chart,
    },
    EndpointDescriptor {
        api_id: "ka10080",
        path: "/api/dostk/chart",
        name: "minute_chart",
        required: &["stk_cd", "tic_scope", "upd_stkpc_tp"],
        optional: &[],
        rows_field: Some("stk_min_pole_chart_qry"),
        cap_rows: false,
        renames: CHART_RENAMES,
        shape: PayloadShape::Chart,
    },
    EndpointDescriptor {
        api_id: "ka10045",
        path: "/api/dostk/mrkcond",
        name: "stock_institution_trading_trend",
        required: &["stk_cd", "strt_dt", "end_dt", "orgn_prsm_unp_tp", "for_prsm_unp_tp"],
        optional: &[],
        rows_field: Some("stk_orgn_trde_trnsn"),
        cap_rows: false,
        renames: FLOW_RENAMES,
        shape: PayloadShape::Flow,
    },
    EndpointDescriptor {
        api_id: "ka10014",
        path: "/api/dostk/shsa",
        name: "short_selling_trend",
        required: &["stk_cd", "tm_tp"],
        optional: &["strt_dt", "end_dt"],
        rows_field: Some("shrts_trnsn"),
        cap_rows: false,
        renames: SHORT_SELLING_RENAMES,
        shape: PayloadShape::Table,
    },
    EndpointDescriptor {
        api_id: "ka90013",
        path: "/api/dostk/mrkcond",
        name: "daily_program_trading_trend",
        required: &["stk_cd", "amt_qty_tp"],
        optional: &["strt_dt", "end_dt"],
        rows_field: Some("stk_daly_prm_trde_trnsn"),
        cap_rows: false,
        renames: FLOW_RENAMES,
        shape: PayloadShape::Flow,
    },
    // ---- ranking (no server-side limit: capped client-side) ----
    EndpointDescriptor {
        api_id: "ka10023",
        path: "/api/dostk/rkinfo",
        name: "trading_volume_surge",
        required: &["mrkt_tp", "sort_tp", "tm_tp", "trde_qty_tp", "stk_cnd", "pric_tp", "stex_tp"],
        optional: &["tm"],
        rows_field: Some("trde_qty_sdnin"),
        cap_rows: true,
        renames: RANKING_RENAMES,
        shape: PayloadShape::Ranking,
    },
    EndpointDescriptor {
        api_id: "ka10030",
        path: "/api/dostk/rkinfo",
        name: "daily_trading_volume_ranking",
        required: &[
            "mrkt_tp", "sort_tp", "mang_stk_incls", "crd_tp", "trde_qty_tp",
            "pric_tp", "trde_prica_tp", "mrkt_open_tp", "stex_tp",
        ],
        optional: &[],
        rows_field: Some("trde_qty_upper"),
        cap_rows: true,
        renames: RANKING_RENAMES,
        shape: PayloadShape::Ranking,
    },
    EndpointDescriptor {
        api_id: "ka10032",
        path: "/api/dostk/rkinfo",
        name: "trading_value_ranking",
        required: &["mrkt_tp", "mang_stk_incls", "stex_tp"],
        optional: &[],
        rows_field: Some("trde_prica_upper"),
        cap_rows: true,
        renames: RANKING_RENAMES,
        shape: PayloadShape::Ranking,
    },
    EndpointDescriptor {
        api_id: "ka10027",
        path: "/api/dostk/rkinfo",
        name: "price_change_ranking",
        required: &[
            "mrkt_tp", "sort_tp", "trde_qty_cnd", "stk_cnd", "crd_cnd",
            "updown_incls", "pric_cnd", "trde_prica_cnd", "stex_tp",
        ],
        optional: &[],
        rows_field: Some("pred_pre_flu_rt_upper"),
        cap_rows: true,
        renames: RANKING_RENAMES,
        shape: PayloadShape::Ranking,
    },
    EndpointDescriptor {
        api_id: "ka10029",
        path: "/api/dostk/rkinfo",
        name: "expected_price_change_ranking",
        required: &["mrkt_tp", "sort_tp", "trde_qty_cnd", "stk_cnd", "crd_cnd", "pric_cnd", "stex_tp"],
        optional: &[],
        rows_field: Some("exp_cntr_flu_rt_upper"),
        cap_rows: true,
        renames: RANKING_RENAMES,
        shape: PayloadShape::Ranking,
    },
    // ---- sector / theme ----
    EndpointDescriptor {
        api_id: "ka10101",
        path: "/api/dostk/stkinfo",
        name: "sector_code_list",
        required: &["mrkt_tp"],
        optional: &[],
        rows_field: Some("list"),
        cap_rows: false,
        renames: SECTOR_RENAMES,
        shape: PayloadShape::Sector,
    },
    EndpointDescriptor {
        api_id: "ka20001",
        path: "/api/dostk/sect",
        name: "sector_current_price",
        required: &["mrkt_tp", "inds_cd"],
        optional: &[],
        rows_field: None,
        cap_rows: false,
        renames: SECTOR_RENAMES,
        shape: PayloadShape::Table,
    },
    EndpointDescriptor {
        api_id: "ka20002",
        path: "/api/dostk/sect",
        name: "sector_stock_prices",
        required: &["mrkt_tp", "inds_cd", "stex_tp"],
        optional: &[],
        rows_field: Some("inds_stkpc"),
        cap_rows: false,
        renames: SECTOR_RENAMES,
        shape: PayloadShape::Sector,
    },
    EndpointDescriptor {
        api_id: "ka20003",
        path: "/api/dostk/sect",
        name: "all_sector_index",
        required: &["inds_cd"],
        optional: &[],
        rows_field: Some("all_inds_idex"),
        cap_rows: false,
        renames: SECTOR_RENAMES,
        shape: PayloadShape::Sector,
    },
    EndpointDescriptor {
        api_id: "ka90001",
        path: "/api/dostk/thme",
        name: "theme_group_info",
        required: &["qry_tp", "date_tp", "flu_pl_amt_tp", "stex_tp"],
        optional: &["stk_cd", "thema_nm"],
        rows_field: Some("thema_grp"),
        cap_rows: false,
        renames: SECTOR_RENAMES,
        shape: PayloadShape::Sector,
    },
    EndpointDescriptor {
        api_id: "ka90002",
        path: "/api/dostk/thme",
        name: "theme_component_stocks",
        required: &["thema_grp_cd", "stex_tp"],
        optional: &["date_tp"],
        rows_field: Some("thema_comp_stk"),
        cap_rows: false,
        renames: SECTOR_RENAMES,
        shape: PayloadShape::Sector,
    },
    // ---- supply / demand ----
    EndpointDescriptor {
        api_id: "ka10131",
        path: "/api/dostk/frgnistt",
        name: "institution_foreign_continuous_trading",
        required: &["dt", "mrkt_tp", "netslmt_tp", "stk_inds_tp", "amt_qty_tp", "stex_tp"],
        optional: &["strt_dt", "end_dt"],
        rows_field: Some("orgn_frgnr_cont_trde_prst"),
        cap_rows: false,
        renames: FLOW_RENAMES,
        shape: PayloadShape::Flow,
    },
    EndpointDescriptor {
        api_id: "ka90009",
        path: "/api/dostk/rkinfo",
        name: "foreign_institution_trading_ranking",
        required: &["mrkt_tp", "amt_qty_tp", "qry_dt_tp", "stex_tp"],
        optional: &["date"],
        rows_field: Some("frgnr_orgn_trde_upper"),
        cap_rows: false,
        renames: FLOW_RENAMES,
        shape: PayloadShape::Flow,
    },
    EndpointDescriptor {
        api_id: "ka10035",
        path: "/api/dostk/rkinfo",
        name: "foreign_continuous_net_trading_ranking",
        required: &["mrkt_tp", "trde_tp", "base_dt_tp", "stex_tp"],
        optional: &[],
        rows_field: Some("frgnr_cont_netprps_upper"),
        cap_rows: false,
        renames: FLOW_RENAMES,
        shape: PayloadShape::Flow,
    },
    EndpointDescriptor {
        api_id: "ka10044",
        path: "/api/dostk/mrkcond",
        name: "daily_institution_trading_stocks",
        required: &["strt_dt", "end_dt", "trde_tp", "mrkt_tp", "stex_tp"],
        optional: &[],
        rows_field: Some("daly_orgn_trde_stk"),
        cap_rows: false,
        renames: FLOW_RENAMES,
        shape: PayloadShape::Flow,
    },
    EndpointDescriptor {
        api_id: "ka10065",
        path: "/api/dostk/rkinfo",
        name: "intraday_investor_trading_ranking",
        required: &["trde_tp", "mrkt_tp", "orgn_tp"],
        optional: &[],
        rows_field: Some("opmr_invsr_trde_upper"),
        cap_rows: false,
        renames: FLOW_RENAMES,
        shape: PayloadShape::Flow,
    },
];

lazy_static! {
    static ref REGISTRY: HashMap<&'static str, &'static EndpointDescriptor> =
        ENDPOINTS.iter().map(|e| (e.api_id, e)).collect();
}

/// Look up a descriptor by opcode.
pub fn endpoint(api_id: &str) -> Option<&'static EndpointDescriptor> {
    REGISTRY.get(api_id).copied()
}

/// All registered opcodes, for diagnostics.
pub fn endpoint_ids() -> Vec<&'static str> {
    ENDPOINTS.iter().map(|e| e.api_id).collect()
}
