//! Interface de terminal do NutriVision — spinner, perguntas e modal de avisos.
//!
//! Usa as crates `indicatif` para o spinner da tela de processamento e
//! `console` para cores e leitura do teclado. O [`FeedbackModal`] é o único
//! assinante do [`FeedbackStore`] e desenha o aviso atual no terminal.

use std::io::{self, BufRead};
use std::time::Duration;

use console::{Style, Term};
use indicatif::{ProgressBar, ProgressStyle};

use crate::api::{AnalysisResult, MealDetail};
use crate::feedback::{Feedback, FeedbackKind, FeedbackStore, Subscription};
use crate::orchestrator::Prompter;
use crate::processing::{AnswerSheet, ProcessingState, Question};

/// Spinner da tela "Analisando sua refeição...".
pub struct ProcessingView {
    pb: ProgressBar,
}

impl ProcessingView {
    pub fn start() -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Iniciando análise...");
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// Atualiza a mensagem com a etapa atual do job.
    pub fn update(&self, state: &ProcessingState) {
        if let ProcessingState::Processing { stage, .. } = state {
            let msg = stage.as_deref().unwrap_or("Iniciando análise...");
            self.pb.set_message(format!("Analisando sua refeição... {msg}"));
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Desenha o aviso do [`FeedbackStore`] a cada mudança.
///
/// Avisos não persistentes são limpos logo depois de exibidos.
pub struct FeedbackModal {
    _subscription: Subscription,
}

impl FeedbackModal {
    pub fn attach(store: &FeedbackStore) -> Self {
        let handle = store.clone();
        let subscription = store.subscribe(move || {
            if let Some(fb) = handle.snapshot() {
                render(&fb);
                if !fb.persistent {
                    handle.clear();
                }
            }
        });
        Self {
            _subscription: subscription,
        }
    }
}

fn style_for(kind: FeedbackKind) -> Style {
    match kind {
        FeedbackKind::Error => Style::new().red().bold(),
        FeedbackKind::Success => Style::new().green().bold(),
        FeedbackKind::Warning => Style::new().yellow().bold(),
        FeedbackKind::Info => Style::new().cyan().bold(),
        FeedbackKind::None => Style::new(),
    }
}

fn render(fb: &Feedback) {
    if fb.kind == FeedbackKind::None {
        return;
    }
    let style = style_for(fb.kind);
    eprintln!();
    if let Some(title) = &fb.title {
        eprintln!("{}", style.apply_to(format!("── {title} ──")));
    }
    eprintln!("  {}", fb.message);
}

/// Fonte de linhas digitadas pelo usuário.
///
/// Fim da entrada vira [`io::ErrorKind::UnexpectedEof`], nunca uma linha vazia.
pub trait LineInput {
    fn next_line(&mut self) -> io::Result<String>;
}

impl<R: BufRead> LineInput for R {
    fn next_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "entrada encerrada",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Lê do terminal quando há um; senão, da entrada padrão.
pub struct TerminalInput {
    term: Term,
}

impl TerminalInput {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl Default for TerminalInput {
    fn default() -> Self {
        Self::new()
    }
}

impl LineInput for TerminalInput {
    fn next_line(&mut self) -> io::Result<String> {
        if self.term.is_term() {
            self.term.read_line()
        } else {
            io::stdin().lock().next_line()
        }
    }
}

/// Espera o usuário confirmar o aviso aberto e executa a ação escolhida.
///
/// Com duas ações é preciso escolher explicitamente; linha vazia não conta.
pub fn acknowledge(store: &FeedbackStore, input: &mut impl LineInput) -> io::Result<()> {
    let Some(fb) = store.snapshot() else {
        return Ok(());
    };
    if !fb.persistent || fb.kind == FeedbackKind::None {
        return Ok(());
    }

    match (&fb.action, &fb.secondary_action) {
        (Some(primary), Some(secondary)) => {
            eprintln!("  [1] {}  [2] {}", primary.label, secondary.label);
            loop {
                match input.next_line()?.trim() {
                    "1" => break primary.invoke(),
                    "2" => break secondary.invoke(),
                    _ => eprintln!("  Escolha 1 ou 2."),
                }
            }
        }
        (Some(action), None) | (None, Some(action)) => {
            eprintln!("  [Enter] {}", action.label);
            input.next_line()?;
            action.invoke();
        }
        (None, None) => {
            eprintln!("  [Enter] OK");
            input.next_line()?;
            store.clear();
        }
    }
    Ok(())
}

/// [`Prompter`] que pergunta no terminal, fora do runtime assíncrono.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    async fn answer(&mut self, questions: &[Question]) -> io::Result<AnswerSheet> {
        let questions = questions.to_vec();
        tokio::task::spawn_blocking(move || ask_questions(&questions, &mut TerminalInput::new()))
            .await
            .map_err(io::Error::other)?
    }
}

/// Faz as perguntas de esclarecimento até todas terem resposta.
pub fn ask_questions(
    questions: &[Question],
    input: &mut impl LineInput,
) -> io::Result<AnswerSheet> {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    let mut sheet = AnswerSheet::new();

    println!();
    println!("{}", bold.apply_to("🤔 Perguntas Rápidas"));
    println!("{}", dim.apply_to("Para uma análise mais precisa"));

    while !sheet.is_complete(questions) {
        for (idx, question) in questions.iter().enumerate() {
            if sheet.get(question.id()).is_some_and(|a| !a.trim().is_empty()) {
                continue;
            }
            println!();
            println!("{} {}", bold.apply_to(format!("{}.", idx + 1)), question.prompt());
            match question {
                Question::Choice { options, .. } => {
                    for (i, option) in options.iter().enumerate() {
                        println!("   [{}] {option}", i + 1);
                    }
                    let line = input.next_line()?;
                    let picked = line
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .map(|i| sheet.choose(question, i));
                    if !matches!(picked, Some(Ok(()))) {
                        println!("{}", dim.apply_to("   Opção inválida."));
                    }
                }
                Question::FreeText { .. } => {
                    println!("{}", dim.apply_to("   Digite sua resposta:"));
                    sheet.set(question.id(), input.next_line()?);
                }
            }
        }
    }
    Ok(sheet)
}

/// Imprime o resultado de uma análise.
pub fn print_analysis(analysis: &AnalysisResult) {
    let green = Style::new().green().bold();
    let yellow = Style::new().yellow();
    let bold = Style::new().bold();

    println!();
    println!("{}", green.apply_to("─── Resultado ───"));
    println!(
        "  {} {:.0} kcal ({:.0}–{:.0})",
        bold.apply_to("Calorias:"),
        analysis.calorias.central,
        analysis.calorias.min,
        analysis.calorias.max
    );
    let m = &analysis.macros;
    println!(
        "  {} proteína {:.0}g · carboidratos {:.0}g · gordura {:.0}g{}",
        bold.apply_to("Macros:"),
        m.proteina_g,
        m.carbo_g,
        m.gordura_g,
        m.fibra_g.map(|f| format!(" · fibra {f:.0}g")).unwrap_or_default()
    );
    if !analysis.confianca.is_empty() {
        println!("  {} {}", bold.apply_to("Confiança:"), analysis.confianca);
    }

    if !analysis.itens_identificados.is_empty() {
        println!("  {}", bold.apply_to("Itens:"));
        for item in &analysis.itens_identificados {
            println!("   • {} ({})", item.nome, item.confianca);
        }
    }
    for (label, list) in [
        ("Benefícios:", &analysis.beneficios),
        ("Pontos de atenção:", &analysis.pontos_de_atencao),
        ("Recomendações:", &analysis.recomendacoes_praticas),
    ] {
        if list.is_empty() {
            continue;
        }
        println!("  {}", bold.apply_to(label));
        for entry in list {
            println!("   • {entry}");
        }
    }
    if let Some(aviso) = &analysis.aviso {
        println!("  {}", yellow.apply_to(aviso));
    }
    if let Some(sugestao) = &analysis.sugestao_melhorada_texto {
        println!("  {} {sugestao}", bold.apply_to("Sugestão:"));
    }
}

/// Imprime o cabeçalho e a análise de uma refeição.
pub fn print_meal(meal: &MealDetail) {
    let dim = Style::new().dim();
    println!(
        "{}",
        dim.apply_to(format!(
            "Refeição #{} · {} · {} · {}",
            meal.id,
            meal.meal_type,
            meal.mode,
            meal.created_at.format("%d/%m/%Y %H:%M")
        ))
    );
    match &meal.analysis {
        Some(analysis) => print_analysis(analysis),
        None => println!("  Análise ainda não disponível (status: {}).", meal.status),
    }
}
